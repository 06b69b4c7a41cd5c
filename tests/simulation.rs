mod common;

use arka_entrypoint::{
    contracts::{init_code, SimpleAccount, SimpleAccountFactory},
    OpOutcome, RejectionReason, SimulationOutcome, UserOperation,
};
use common::*;
use ethers::{signers::Signer, types::U256};

#[tokio::test]
async fn test_simulate_validation_leaves_state_untouched() {
    let mut ep = entry_point();
    let wallet = owner();
    let sender = addr(0xa1);
    ep.chain_mut()
        .install_account(sender, Box::new(SimpleAccount::new(wallet.address())))
        .unwrap();
    ep.chain_mut().credit(sender, 500_000.into());
    ep.drain_events();

    let op = sign(&ep, user_op(sender, 0), &wallet).await;
    let result = ep.simulate_validation(&op);

    assert_eq!(result.outcome, SimulationOutcome::Valid);
    assert_eq!(result.required_prefund, 171_000.into());
    assert_eq!(result.pre_op_gas, 32_000.into());
    assert_eq!((result.valid_after, result.valid_until), (0, 0));
    assert_eq!(result.sender_info.address, sender);
    assert_eq!(result.paymaster_info, None);

    // the account paid its missing funds only inside the snapshot
    assert_eq!(ep.balance_of(sender), U256::zero());
    assert_eq!(ep.chain().balance(sender), 500_000.into());
    assert!(ep.drain_events().is_empty());

    // nonce 0 is still available for the real run
    let report = ep.handle_ops(&[op], beneficiary()).unwrap();
    assert!(matches!(report.outcomes[0], OpOutcome::Executed { .. }));
}

#[test]
fn test_simulate_validation_reports_rejection() {
    let ep = entry_point();
    let result = ep.simulate_validation(&user_op(addr(0xa1), 0));
    assert_eq!(
        result.outcome,
        SimulationOutcome::Rejected {
            reason: RejectionReason::InsufficientFunds {
                required: 171_000.into(),
                available: U256::zero(),
            }
        }
    );
    assert_eq!(result.required_prefund, 171_000.into());
}

#[tokio::test]
async fn test_simulated_deployment_is_not_committed() {
    let mut ep = entry_point();
    let factory = addr(0xfac);
    ep.chain_mut()
        .install_factory(factory, Box::new(SimpleAccountFactory))
        .unwrap();
    let wallet = owner();
    let sender = SimpleAccountFactory::get_address(factory, wallet.address(), U256::zero());
    ep.deposit_to(sender, 200_000.into()).unwrap();

    let op = UserOperation {
        init_code: init_code(factory, wallet.address(), U256::zero()),
        ..user_op(sender, 0)
    };
    let op = sign(&ep, op, &wallet).await;

    let result = ep.simulate_validation(&op);
    assert_eq!(result.outcome, SimulationOutcome::Valid);
    assert_eq!(result.pre_op_gas, 72_000.into());
    assert!(!ep.chain().has_code(sender));

    let short = UserOperation {
        verification_gas_limit: 30_000.into(),
        ..op.clone()
    };
    assert!(matches!(
        ep.simulate_validation(&short).outcome,
        SimulationOutcome::DeploymentFailed { .. }
    ));
}

#[test]
fn test_simulate_handle_op_predicts_outcome() {
    let mut ep = entry_point();
    let sender = addr(0xa1);
    ep.chain_mut()
        .install_account(sender, Box::new(CounterAccount::default()))
        .unwrap();
    ep.deposit_to(sender, 1_000_000.into()).unwrap();

    let op = with_call(user_op(sender, 0), REQUIRE_INCREMENTED);
    let predicted = ep.simulate_handle_op(&op);
    assert!(matches!(predicted, OpOutcome::CallReverted { .. }));
    assert_eq!(ep.balance_of(sender), 1_000_000.into());
    assert!(!ep.is_nonce_used(sender, U256::zero()));

    let report = ep.handle_ops(&[op], beneficiary()).unwrap();
    assert_eq!(report.outcomes[0], predicted);
}

#[test]
fn test_hash_ignores_signature() {
    let ep = entry_point();
    let op = user_op(addr(0xa1), 0);
    let signed = UserOperation {
        signature: vec![1u8; 65].into(),
        ..op.clone()
    };
    assert_eq!(ep.get_user_op_hash(&op), ep.get_user_op_hash(&signed));

    let bumped = UserOperation {
        nonce: 1.into(),
        ..op.clone()
    };
    assert_ne!(ep.get_user_op_hash(&op), ep.get_user_op_hash(&bumped));
}
