mod common;

use common::*;
use ocr2::access_controller::AccessController;
use ocr2::billing::Billing;
use ocr2::event::{self, Event};
use ocr2::{Address, Context, ErrorCode, MemoryLedger, TokenLedger};

/// Earned by the submitter of a report carrying `observations` observations.
fn transmitter_share(observations: u128) -> u128 {
    REIMBURSEMENT + TRANSMISSION_PAYMENT + observations * OBSERVATION_PAYMENT
}

fn assign_payees(h: &mut Harness, oracles: std::ops::Range<usize>) {
    let transmitters: Vec<_> = oracles.clone().map(transmitter).collect();
    let payees: Vec<_> = oracles.map(payee).collect();
    h.aggregator
        .set_payees(&owner(), &transmitters, &payees)
        .unwrap();
}

fn paid(events: &[Event]) -> Vec<event::OraclePaid> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::OraclePaid(paid) => Some(paid.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn transmission_accrues_payments() {
    let mut h = Harness::new(4, 1);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();

    assert_eq!(
        h.aggregator.owed_payment(&transmitter(0)),
        transmitter_share(3)
    );
    // observers and signers that did not submit earn nothing
    for i in 1..4 {
        assert_eq!(h.aggregator.owed_payment(&transmitter(i)), 0);
    }
    assert_eq!(h.aggregator.total_owed(), transmitter_share(3));

    // observers are still counted
    let counts: Vec<_> = (0..4)
        .map(|i| h.aggregator.oracle_observation_count(&transmitter(i)))
        .collect();
    assert_eq!(counts, vec![1, 1, 1, 0]);
}

#[test]
fn billing_changes_are_not_retroactive() {
    let mut h = Harness::new(4, 1);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    let before = h.aggregator.owed_payment(&transmitter(0));

    let billing = Billing {
        maximum_gas_price_gwei: 5,
        observation_payment_gjuels: 5,
        ..billing()
    };
    assert_eq!(
        h.aggregator.set_billing(&Context::new(OUTSIDER), billing),
        Err(ErrorCode::Unauthorized)
    );
    h.aggregator.take_events();
    h.aggregator.set_billing(&owner(), billing).unwrap();
    assert_eq!(
        h.aggregator.events(),
        [Event::BillingSet(event::BillingSet { billing })]
    );
    assert_eq!(h.aggregator.get_billing(), billing);
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), before);

    // paying 10 gwei against a 5 gwei maximum is reimbursed at the maximum
    h.transmit(1, 1, 2, &[1, 2, 3], &[0, 1]).unwrap();
    let reimbursement = 5 * 1_000_000_000 * u128::from(GAS_USED);
    assert_eq!(
        h.aggregator.owed_payment(&transmitter(1)),
        reimbursement + TRANSMISSION_PAYMENT + 3 * 5 * OBSERVATION_PAYMENT
    );
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), before);
}

#[test]
fn billing_access_controller_delegates() {
    let mut h = Harness::new(4, 1);
    let operator = Address([0x31; 20]);
    let mut controller = AccessController::new(Address([0x30; 20]), OWNER);
    controller.add_access(&OWNER, operator).unwrap();
    h.aggregator
        .set_billing_access_controller(&owner(), Some(controller))
        .unwrap();
    assert_eq!(
        h.aggregator.get_billing_access_controller(),
        Address([0x30; 20])
    );

    let ctx = Context::new(operator);
    h.aggregator.set_billing(&ctx, billing()).unwrap();
    assert_eq!(h.aggregator.pay_oracles(&ctx, &mut h.ledger), Ok(0));

    h.aggregator
        .billing_access_controller_mut()
        .unwrap()
        .remove_access(&OWNER, &operator)
        .unwrap();
    assert_eq!(
        h.aggregator.set_billing(&ctx, billing()),
        Err(ErrorCode::Unauthorized)
    );
}

#[test]
fn withdraw_payment() {
    let mut h = Harness::new(4, 1);
    assign_payees(&mut h, 0..4);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    let owed = h.aggregator.owed_payment(&transmitter(0));
    let recipient = Address([0x21; 20]);

    // only the payee withdraws
    assert_eq!(
        h.aggregator.withdraw_payment(
            &Context::new(transmitter(0)),
            &mut h.ledger,
            transmitter(0),
            recipient,
            1
        ),
        Err(ErrorCode::Unauthorized)
    );

    let ctx = Context::new(payee(0));
    assert_eq!(
        h.aggregator
            .withdraw_payment(&ctx, &mut h.ledger, transmitter(0), recipient, owed + 1),
        Err(ErrorCode::InsufficientFunds)
    );

    // the aggregator holds nothing yet
    assert_eq!(
        h.aggregator
            .withdraw_payment(&ctx, &mut h.ledger, transmitter(0), recipient, owed),
        Err(ErrorCode::InsufficientFunds)
    );
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), owed);

    h.ledger.mint(&CONTRACT, owed);
    h.ledger.freeze(&recipient);
    assert_eq!(
        h.aggregator
            .withdraw_payment(&ctx, &mut h.ledger, transmitter(0), recipient, owed),
        Err(ErrorCode::TransferFailed)
    );
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), owed);
    assert_eq!(h.ledger.balance_of(&CONTRACT), owed);

    h.ledger.thaw(&recipient);
    h.aggregator.take_events();
    h.aggregator
        .withdraw_payment(&ctx, &mut h.ledger, transmitter(0), recipient, owed - 10)
        .unwrap();
    assert_eq!(h.ledger.balance_of(&recipient), owed - 10);
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), 10);
    assert_eq!(
        paid(h.aggregator.events()),
        vec![event::OraclePaid {
            transmitter: transmitter(0),
            payee: payee(0),
            amount: owed - 10,
            link_token: LINK,
        }]
    );

    let mut foreign = MemoryLedger::new(Address([0x12; 20]));
    assert_eq!(
        h.aggregator
            .withdraw_payment(&ctx, &mut foreign, transmitter(0), recipient, 10),
        Err(ErrorCode::InvalidTokenAccount)
    );
}

#[test]
fn balances_survive_reconfiguration() {
    let mut h = Harness::new(4, 1);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    h.transmit(2, 1, 2, &[1, 2, 3, 4], &[0, 1]).unwrap();
    let total = h.aggregator.total_owed();
    let owed: Vec<_> = (0..4)
        .map(|i| h.aggregator.owed_payment(&transmitter(i)))
        .collect();

    h.reconfigure(4, 1, 4);
    assert_eq!(h.aggregator.total_owed(), total);
    for (i, owed) in owed.iter().enumerate() {
        assert_eq!(h.aggregator.owed_payment(&transmitter(i)), *owed);
        assert_eq!(h.aggregator.oracle_observation_count(&transmitter(i)), 0);
    }

    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    assert_eq!(
        h.aggregator.total_owed(),
        total + transmitter_share(3)
    );

    // oracles of both committees are paid, archived balances included
    assign_payees(&mut h, 0..8);
    let due = h.aggregator.total_owed();
    h.ledger.mint(&CONTRACT, due + 7);
    h.aggregator.take_events();
    assert_eq!(h.aggregator.pay_oracles(&owner(), &mut h.ledger), Ok(due));

    assert_eq!(h.aggregator.total_owed(), 0);
    assert_eq!(h.ledger.balance_of(&payee(0)), owed[0]);
    assert_eq!(h.ledger.balance_of(&payee(2)), owed[2]);
    assert_eq!(h.ledger.balance_of(&payee(4)), transmitter_share(3));
    assert_eq!(h.ledger.balance_of(&CONTRACT), 7);
    // only oracles that submitted were owed anything
    assert_eq!(paid(h.aggregator.events()).len(), 3);
}

#[test]
fn pay_oracles_is_all_or_nothing() {
    let mut h = Harness::new(4, 1);
    assign_payees(&mut h, 0..4);
    h.transmit(0, 1, 1, &[1, 2, 3, 4], &[0, 1]).unwrap();
    h.transmit(2, 1, 2, &[1, 2, 3, 4], &[0, 1]).unwrap();
    let due = h.aggregator.total_owed();
    assert_eq!(due, 2 * transmitter_share(4));

    assert_eq!(
        h.aggregator.pay_oracles(&Context::new(OUTSIDER), &mut h.ledger),
        Err(ErrorCode::Unauthorized)
    );
    assert_eq!(
        h.aggregator.pay_oracles(&owner(), &mut h.ledger),
        Err(ErrorCode::InsufficientFunds)
    );

    h.ledger.mint(&CONTRACT, due);
    h.ledger.freeze(&payee(2));
    assert_eq!(
        h.aggregator.pay_oracles(&owner(), &mut h.ledger),
        Err(ErrorCode::TransferFailed)
    );
    assert_eq!(h.aggregator.total_owed(), due);
    assert_eq!(h.ledger.balance_of(&payee(0)), 0);
    assert_eq!(h.ledger.balance_of(&CONTRACT), due);

    h.ledger.thaw(&payee(2));
    assert_eq!(h.aggregator.pay_oracles(&owner(), &mut h.ledger), Ok(due));
    assert_eq!(h.ledger.balance_of(&payee(0)), transmitter_share(4));
    assert_eq!(h.ledger.balance_of(&payee(2)), transmitter_share(4));
}

#[test]
fn pay_oracles_skips_oracles_without_payee() {
    let mut h = Harness::new(4, 1);
    assign_payees(&mut h, 0..1);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    h.transmit(1, 1, 2, &[1, 2, 3], &[0, 1]).unwrap();
    h.ledger.mint(&CONTRACT, h.aggregator.total_owed());

    assert_eq!(
        h.aggregator.pay_oracles(&owner(), &mut h.ledger),
        Ok(transmitter_share(3))
    );
    assert_eq!(h.aggregator.owed_payment(&transmitter(0)), 0);
    assert_eq!(
        h.aggregator.owed_payment(&transmitter(1)),
        transmitter_share(3)
    );
}

#[test]
fn withdraw_funds_keeps_owed_balances() {
    let mut h = Harness::new(4, 1);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    let due = h.aggregator.total_owed();
    let recipient = Address([0x22; 20]);

    // underfunded
    h.ledger.mint(&CONTRACT, due - 5);
    assert_eq!(
        h.aggregator.link_available_for_payment(&h.ledger),
        Ok(-5)
    );
    assert_eq!(
        h.aggregator
            .withdraw_funds(&owner(), &mut h.ledger, recipient, 1),
        Err(ErrorCode::InsufficientFunds)
    );

    h.ledger.mint(&CONTRACT, 1_005);
    assert_eq!(
        h.aggregator.link_available_for_payment(&h.ledger),
        Ok(1_000)
    );
    assert_eq!(
        h.aggregator
            .withdraw_funds(&Context::new(OUTSIDER), &mut h.ledger, recipient, 1),
        Err(ErrorCode::Unauthorized)
    );
    assert_eq!(
        h.aggregator
            .withdraw_funds(&owner(), &mut h.ledger, recipient, 400),
        Ok(400)
    );
    // capped at what is not owed
    assert_eq!(
        h.aggregator
            .withdraw_funds(&owner(), &mut h.ledger, recipient, u128::MAX),
        Ok(600)
    );
    assert_eq!(h.ledger.balance_of(&recipient), 1_000);
    assert_eq!(h.ledger.balance_of(&CONTRACT), due);
    assert_eq!(h.aggregator.link_available_for_payment(&h.ledger), Ok(0));
}

#[test]
fn set_link_token_settles_in_old_token() {
    let mut h = Harness::new(4, 1);
    assign_payees(&mut h, 0..4);
    h.transmit(0, 1, 1, &[1, 2, 3], &[0, 1]).unwrap();
    let due = h.aggregator.total_owed();
    h.ledger.mint(&CONTRACT, due + 50);

    let next_token = Address([0x13; 20]);
    let recipient = Address([0x23; 20]);
    assert_eq!(
        h.aggregator
            .set_link_token(&Context::new(OUTSIDER), &mut h.ledger, next_token, recipient),
        Err(ErrorCode::Unauthorized)
    );
    let mut wrong = MemoryLedger::new(next_token);
    assert_eq!(
        h.aggregator
            .set_link_token(&owner(), &mut wrong, next_token, recipient),
        Err(ErrorCode::InvalidTokenAccount)
    );

    h.aggregator.take_events();
    h.aggregator
        .set_link_token(&owner(), &mut h.ledger, next_token, recipient)
        .unwrap();
    assert_eq!(h.aggregator.get_link_token(), next_token);
    assert_eq!(h.aggregator.total_owed(), 0);
    assert_eq!(h.ledger.balance_of(&payee(0)), transmitter_share(3));
    assert_eq!(h.ledger.balance_of(&recipient), 50);
    assert_eq!(h.ledger.balance_of(&CONTRACT), 0);
    assert!(h.aggregator.events().contains(&Event::LinkTokenSet(
        event::LinkTokenSet {
            old: LINK,
            current: next_token,
        }
    )));

    // the old token no longer pays
    assert_eq!(
        h.aggregator.link_available_for_payment(&h.ledger),
        Err(ErrorCode::InvalidTokenAccount)
    );
    assert_eq!(h.aggregator.link_available_for_payment(&wrong), Ok(0));
}

#[test]
fn payee_handshake() {
    let mut h = Harness::new(4, 1);
    h.aggregator.take_events();
    assign_payees(&mut h, 0..2);
    assert_eq!(h.aggregator.payee(&transmitter(1)), Some(payee(1)));
    assert_eq!(h.aggregator.events().len(), 2);

    // reassigning the same payee is a no-op, a different one is rejected
    h.aggregator.take_events();
    assign_payees(&mut h, 0..1);
    assert!(h.aggregator.events().is_empty());
    assert_eq!(
        h.aggregator
            .set_payees(&owner(), &[transmitter(0)], &[payee(5)]),
        Err(ErrorCode::PayeeAlreadySet)
    );
    assert_eq!(
        h.aggregator
            .set_payees(&Context::new(OUTSIDER), &[transmitter(3)], &[payee(3)]),
        Err(ErrorCode::Unauthorized)
    );

    let proposed = Address([0x91; 20]);
    assert_eq!(
        h.aggregator
            .transfer_payeeship(&Context::new(OUTSIDER), transmitter(0), proposed),
        Err(ErrorCode::Unauthorized)
    );
    h.aggregator
        .transfer_payeeship(&Context::new(payee(0)), transmitter(0), proposed)
        .unwrap();
    assert_eq!(
        h.aggregator.events(),
        [Event::PayeeshipTransferRequested(
            event::PayeeshipTransferRequested {
                transmitter: transmitter(0),
                current: payee(0),
                proposed,
            }
        )]
    );
    // still the old payee until accepted
    assert_eq!(h.aggregator.payee(&transmitter(0)), Some(payee(0)));

    assert_eq!(
        h.aggregator
            .accept_payeeship(&Context::new(payee(1)), transmitter(0)),
        Err(ErrorCode::Unauthorized)
    );
    h.aggregator.take_events();
    h.aggregator
        .accept_payeeship(&Context::new(proposed), transmitter(0))
        .unwrap();
    assert_eq!(h.aggregator.payee(&transmitter(0)), Some(proposed));
    assert_eq!(
        h.aggregator.events(),
        [Event::PayeeshipTransferred(event::PayeeshipTransferred {
            transmitter: transmitter(0),
            previous: payee(0),
            current: proposed,
        })]
    );
}
