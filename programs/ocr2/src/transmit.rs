use tracing::{debug, warn};

use crate::billing::Payment;
use crate::context::Context;
use crate::event;
use crate::report::{Report, ReportContext};
use crate::signature::{self, report_hash, SignerRecovery};
use crate::store::Transmission;
use crate::{Aggregator, ErrorCode, Result};

/// Everything a transmission changes, computed against the current state and applied only
/// once every check passed.
#[derive(Debug)]
struct PendingTransmission {
    context: ReportContext,
    transmitter_index: usize,
    report: Report,
    answer: i128,
    payment: Payment,
}

impl<R: SignerRecovery> Aggregator<R> {
    /// Accepts a signed report from an active transmitter and returns the new round id.
    pub fn transmit(
        &mut self,
        ctx: &Context,
        report_context: &[[u8; 32]; 3],
        report: &[u8],
        rs: &[[u8; 32]],
        ss: &[[u8; 32]],
        raw_vs: &[u8; 32],
    ) -> Result<u32> {
        let pending = self
            .prepare_transmission(ctx, report_context, report, rs, ss, raw_vs)
            .map_err(|err| {
                debug!(%err, transmitter = %ctx.sender, "transmission rejected");
                err
            })?;
        self.commit_transmission(ctx, pending)
    }

    fn prepare_transmission(
        &self,
        ctx: &Context,
        report_context: &[[u8; 32]; 3],
        raw_report: &[u8],
        rs: &[[u8; 32]],
        ss: &[[u8; 32]],
        raw_vs: &[u8; 32],
    ) -> Result<PendingTransmission> {
        require!(self.config.is_configured(), NotConfigured);
        let transmitter_index = self
            .config
            .transmitter_index(&ctx.sender)
            .ok_or(ErrorCode::UnauthorizedTransmitter)?;

        let context = ReportContext::from_words(report_context)?;
        require!(
            context.config_digest == self.config.latest_config_digest,
            StaleConfig
        );

        let hash = report_hash(report_context, raw_report);
        signature::verify(
            &self.recovery,
            &self.config,
            self.signature_policy,
            &hash,
            rs,
            ss,
            raw_vs,
        )?;

        let report = Report::decode(raw_report, self.config.oracles.len(), self.config.f)?;
        let answer = report.median(self.median_policy)?;
        require!(
            self.min_answer <= answer && answer <= self.max_answer,
            AnswerOutOfBounds
        );

        self.transmissions.check_fresh(context.epoch, context.round)?;
        self.transmissions.next_round_id()?;

        let payment = self.billing.compute_payment(
            ctx.gas_used,
            ctx.gas_price_wei,
            report.juels_per_fee_coin,
            report.observers.len(),
        );

        Ok(PendingTransmission {
            context,
            transmitter_index,
            report,
            answer,
            payment,
        })
    }

    fn commit_transmission(&mut self, ctx: &Context, pending: PendingTransmission) -> Result<u32> {
        let PendingTransmission {
            context,
            transmitter_index,
            report,
            answer,
            payment,
        } = pending;

        let previous_round_id = self.transmissions.latest_round_id();
        let previous_answer = self
            .transmissions
            .latest()
            .map(|transmission| transmission.answer)
            .unwrap_or_default();

        // the only fallible step, so it goes first
        let round_id = self.transmissions.record(
            context.epoch,
            context.round,
            context.config_digest,
            Transmission {
                timestamp: u64::from(report.observations_timestamp),
                transmission_timestamp: ctx.timestamp,
                answer,
            },
        )?;

        // only the submitter is paid; observers are credited a count
        let transmitter = &mut self.config.oracles[transmitter_index];
        transmitter.payment_juels = transmitter
            .payment_juels
            .saturating_add(payment.total_juels());
        for &observer in &report.observers {
            let oracle = &mut self.config.oracles[usize::from(observer)];
            oracle.observation_count = oracle.observation_count.saturating_add(1);
        }

        debug!(
            round_id,
            answer,
            epoch = context.epoch,
            round = context.round,
            transmitter = %ctx.sender,
            "transmission accepted"
        );

        self.emit(event::NewTransmission {
            round_id,
            answer,
            transmitter: ctx.sender,
            observations_timestamp: report.observations_timestamp,
            observations: report.observations,
            observers: report.observers,
            juels_per_fee_coin: report.juels_per_fee_coin,
            config_digest: context.config_digest,
            epoch_and_round: context.epoch_and_round(),
        });
        self.emit(event::Transmitted {
            config_digest: context.config_digest,
            epoch: context.epoch,
        });
        self.emit(event::AnswerUpdated {
            current: answer,
            round_id,
            updated_at: ctx.timestamp,
        });
        self.emit(event::NewRound {
            round_id,
            started_by: ctx.sender,
            started_at: u64::from(report.observations_timestamp),
        });

        self.notify_validator(previous_round_id, previous_answer, round_id, answer);

        Ok(round_id)
    }

    fn notify_validator(
        &mut self,
        previous_round_id: u32,
        previous_answer: i128,
        round_id: u32,
        answer: i128,
    ) {
        if !self.validator.is_active() {
            return;
        }
        let feed = self.contract_address;
        let Some(validator) = self.validator.validator.as_mut() else {
            return;
        };
        match validator.validate(&feed, previous_round_id, previous_answer, round_id, answer) {
            Ok(true) => {}
            Ok(false) => debug!(round_id, answer, "validator flagged answer"),
            // best effort, the transmission stands
            Err(err) => warn!(%err, round_id, "validator call failed"),
        }
    }
}
