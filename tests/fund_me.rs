mod support;

use fundme::{
    chain::{tx::Call, tx::Receipt, ChainError},
    contracts::FundMeError,
    oracle::OracleError,
    Wallet,
};
use support::{TestHarness, TestResult, SEND_VALUE};

fn funded_by_five(harness: &mut TestHarness) -> TestResult<Vec<Wallet>> {
    let funders: Vec<Wallet> = (1..6).map(TestHarness::account).collect();
    for funder in &funders {
        harness.fund(funder, SEND_VALUE)?;
    }
    Ok(funders)
}

/// Contract balance plus owner balance before the call equals owner balance
/// plus gas paid after it.
fn assert_owner_collects_everything(
    harness: &TestHarness,
    starting_contract: u128,
    starting_owner: u128,
    receipt: &Receipt,
) {
    let owner = harness.deployer.address();
    assert_eq!(harness.balance(&harness.fund_me), 0);
    assert_eq!(
        starting_contract + starting_owner,
        harness.balance(&owner) + receipt.gas_cost()
    );
}

#[test]
fn constructor_sets_the_aggregator_address() -> TestResult {
    let harness = TestHarness::new()?;
    assert_eq!(harness.contract()?.price_feed(), harness.price_feed);
    assert_eq!(harness.contract()?.owner(), harness.deployer.address());
    Ok(())
}

#[test]
fn fund_without_enough_value_reverts() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    let err = harness.fund(&deployer, 0).unwrap_err();
    assert!(matches!(
        err,
        ChainError::Reverted(FundMeError::InsufficientFunds { .. })
    ));
    assert!(harness.contract()?.funders().is_empty());
    Ok(())
}

#[test]
fn fund_updates_the_amount_funded() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;
    assert_eq!(
        harness.contract()?.amount_funded(&deployer.address()),
        SEND_VALUE
    );
    Ok(())
}

#[test]
fn fund_appends_to_the_funders() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;
    assert_eq!(harness.contract()?.funder(0)?, deployer.address());
    Ok(())
}

#[test]
fn withdraw_from_a_single_funder() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;

    let starting_contract = harness.balance(&harness.fund_me);
    let starting_owner = harness.balance(&deployer.address());
    let receipt = harness.withdraw(&deployer)?;

    assert_owner_collects_everything(&harness, starting_contract, starting_owner, &receipt);
    Ok(())
}

#[test]
fn withdraw_with_multiple_funders() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;
    let funders = funded_by_five(&mut harness)?;

    let starting_contract = harness.balance(&harness.fund_me);
    let starting_owner = harness.balance(&deployer.address());
    let receipt = harness.withdraw(&deployer)?;

    assert_owner_collects_everything(&harness, starting_contract, starting_owner, &receipt);
    let contract = harness.contract()?;
    assert!(matches!(
        contract.funder(0),
        Err(FundMeError::FunderIndexOutOfBounds { index: 0, len: 0 })
    ));
    for funder in &funders {
        assert_eq!(contract.amount_funded(&funder.address()), 0);
    }
    Ok(())
}

#[test]
fn only_the_owner_can_withdraw() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;

    let attacker = TestHarness::account(1);
    let err = harness.withdraw(&attacker).unwrap_err();
    assert!(matches!(err, ChainError::Reverted(FundMeError::NotOwner)));
    assert!(err.to_string().contains("FundMe__NotOwner"));
    assert_eq!(harness.balance(&harness.fund_me), SEND_VALUE);

    let err = harness.cheaper_withdraw(&attacker).unwrap_err();
    assert!(matches!(err, ChainError::Reverted(FundMeError::NotOwner)));
    Ok(())
}

#[test]
fn cheaper_withdraw_from_a_single_funder() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;

    let starting_contract = harness.balance(&harness.fund_me);
    let starting_owner = harness.balance(&deployer.address());
    let receipt = harness.cheaper_withdraw(&deployer)?;

    assert_owner_collects_everything(&harness, starting_contract, starting_owner, &receipt);
    Ok(())
}

#[test]
fn cheaper_withdraw_with_multiple_funders() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    harness.fund(&deployer, SEND_VALUE)?;
    let funders = funded_by_five(&mut harness)?;

    let starting_contract = harness.balance(&harness.fund_me);
    let starting_owner = harness.balance(&deployer.address());
    let receipt = harness.cheaper_withdraw(&deployer)?;

    assert_owner_collects_everything(&harness, starting_contract, starting_owner, &receipt);
    let contract = harness.contract()?;
    assert!(contract.funder(0).is_err());
    for funder in &funders {
        assert_eq!(contract.amount_funded(&funder.address()), 0);
    }
    Ok(())
}

#[test]
fn cheaper_withdraw_uses_less_gas() -> TestResult {
    let mut baseline = TestHarness::new()?;
    let mut cheaper = TestHarness::new()?;
    let deployer = baseline.deployer.clone();
    funded_by_five(&mut baseline)?;
    funded_by_five(&mut cheaper)?;

    let baseline_receipt = baseline.withdraw(&deployer)?;
    let cheaper_receipt = cheaper.cheaper_withdraw(&deployer)?;
    assert!(cheaper_receipt.gas_used < baseline_receipt.gas_used);
    assert_eq!(
        baseline.balance(&deployer.address()) + baseline_receipt.gas_cost(),
        cheaper.balance(&deployer.address()) + cheaper_receipt.gas_cost()
    );
    Ok(())
}

#[test]
fn withdraw_with_no_funders_pays_nothing() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    let before = harness.balance(&deployer.address());
    let receipt = harness.withdraw(&deployer)?;
    assert_eq!(harness.balance(&deployer.address()), before - receipt.gas_cost());
    Ok(())
}

#[test]
fn funding_tracks_the_feed_price() -> TestResult {
    let mut harness = TestHarness::new()?;
    let deployer = harness.deployer.clone();
    let funder = TestHarness::account(1);
    // 0.03 ether is 60 USD at 2000, 30 USD at 1000
    let value = SEND_VALUE * 3 / 100;
    harness.fund(&funder, value)?;

    let feed = harness.price_feed;
    harness.chain.transact(
        &deployer,
        Some(feed),
        0,
        Call::UpdateAnswer {
            answer: 100_000_000_000,
        },
    )?;
    assert!(matches!(
        harness.fund(&funder, value),
        Err(ChainError::Reverted(FundMeError::InsufficientFunds { .. }))
    ));

    harness
        .chain
        .transact(&deployer, Some(feed), 0, Call::UpdateAnswer { answer: -1 })?;
    assert!(matches!(
        harness.fund(&funder, SEND_VALUE),
        Err(ChainError::Reverted(FundMeError::OracleUnavailable(
            OracleError::InvalidAnswer(-1)
        )))
    ));
    Ok(())
}

#[test]
fn ledger_matches_contract_balance() -> TestResult {
    let mut harness = TestHarness::new()?;
    funded_by_five(&mut harness)?;
    let again = TestHarness::account(2);
    harness.fund(&again, SEND_VALUE)?;

    let contract = harness.contract()?;
    assert_eq!(contract.total_funded(), harness.balance(&harness.fund_me));
    assert_eq!(contract.funders().len(), 6);
    assert_eq!(contract.amount_funded(&again.address()), 2 * SEND_VALUE);
    Ok(())
}
