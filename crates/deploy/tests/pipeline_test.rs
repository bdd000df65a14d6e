//! End-to-end tests of the deployment pipeline against in-memory collaborators.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use nightcap_deploy::{
    CompactCompiler, DeployConfig, DeployError, KeyPair, Pipeline, SeedInputs, SeedSource,
    config::{
        ArgSource, ContractConfig, FundingConfig, InitArg, InitConfig, KeyRef, NetworkConfig,
        StorageConfig, ToolchainConfig,
    },
    error::CompilerStatus,
    providers::{ApplyStage, Network, ProofProvider, PublicDataProvider, TxData, ZkConfig},
    runtime::{ArgumentValue, CallOutput, CallRequest, ContractRuntime, DeployOutput, DeployRequest},
    seed::DeployerSeed,
    tx::{
        BalancedTransaction, ContractAddress, LedgerTransaction, NetworkId, TransactionId,
        UnbalancedTransaction, UnprovenTransaction, ZswapTransaction,
    },
    wallet::{WalletSession, WalletState},
};
use tempdir::TempDir;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

const NETWORK: NetworkId = NetworkId::Undeployed;
const TOKEN: &str = "02";
const SEED: &str = "3f1c9e27b5d04a8e6f7a2b9c0d1e3f405162738495a6b7c8d9eaf0b1c2d3e4f5";

const CONTRACT_INFO_JSON: &str = r#"{
    "circuits": [
        {
            "name": "initialize",
            "pure": false,
            "arguments": [
                { "name": "initialAdminPk", "type": { "type-name": "Bytes", "length": 32 } }
            ]
        }
    ],
    "witnesses": [ { "name": "adminSecretKey", "arguments": [] } ]
}"#;

/// Failures injected into the fakes.
#[derive(Debug, Clone, Copy)]
struct Faults {
    /// Deploy call (0-based) that fails.
    fail_deploy_at: Option<usize>,
    /// Every circuit call fails.
    fail_calls: bool,
    /// Apply stage reported by the indexer.
    apply_stage: ApplyStage,
}

impl Default for Faults {
    fn default() -> Self {
        Self {
            fail_deploy_at: None,
            fail_calls: false,
            apply_stage: ApplyStage::SucceedEntirely,
        }
    }
}

/// Counters shared between the fakes and the test body.
#[derive(Debug, Clone, Default)]
struct Calls {
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    deploys: Arc<AtomicUsize>,
    submissions: Arc<AtomicUsize>,
    circuit_calls: Arc<Mutex<Vec<(String, Vec<ArgumentValue>)>>>,
}

struct FakeSession {
    state: watch::Receiver<WalletState>,
    _sender: watch::Sender<WalletState>,
    calls: Calls,
}

impl WalletSession for FakeSession {
    fn state(&self) -> watch::Receiver<WalletState> {
        self.state.clone()
    }

    async fn balance_transaction(
        &self,
        tx: ZswapTransaction,
        _new_coins: Vec<String>,
    ) -> anyhow::Result<ZswapTransaction> {
        let mut body = tx.body().to_vec();
        body.extend_from_slice(b"+fees");
        Ok(ZswapTransaction::from_body(body))
    }

    async fn prove_transaction(&self, tx: ZswapTransaction) -> anyhow::Result<ZswapTransaction> {
        Ok(tx)
    }

    async fn submit_transaction(&self, tx: &BalancedTransaction) -> anyhow::Result<TransactionId> {
        assert!(tx.body().ends_with(b"+fees"), "submitted an unbalanced transaction");
        let n = self.calls.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(TransactionId::from(format!("tx-{n}")))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.calls.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeIndexer {
    apply_stage: ApplyStage,
}

impl PublicDataProvider for FakeIndexer {
    async fn watch_for_tx_data(&self, tx_id: &TransactionId) -> anyhow::Result<TxData> {
        Ok(TxData {
            tx_id: tx_id.clone(),
            tx_hash: format!("hash-{tx_id}"),
            block_height: 7,
            block_hash: "block".to_string(),
            status: self.apply_stage,
        })
    }

    async fn query_contract_state(
        &self,
        _address: &ContractAddress,
    ) -> anyhow::Result<Option<String>> {
        Ok(Some("00".to_string()))
    }
}

struct FakeProver;

impl ProofProvider for FakeProver {
    async fn prove_tx(
        &self,
        tx: &UnprovenTransaction,
        _zk_configs: &[ZkConfig],
    ) -> anyhow::Result<UnbalancedTransaction> {
        Ok(UnbalancedTransaction(tx.0.clone()))
    }
}

struct FakeNetwork {
    balance: u128,
    apply_stage: ApplyStage,
    calls: Calls,
}

impl Network for FakeNetwork {
    type Session = FakeSession;
    type PublicData = FakeIndexer;
    type Prover = FakeProver;

    fn network_id(&self) -> NetworkId {
        NETWORK
    }

    async fn open_wallet(&self, _seed: &DeployerSeed) -> anyhow::Result<FakeSession> {
        self.calls.opened.fetch_add(1, Ordering::SeqCst);
        let (sender, state) = watch::channel(WalletState {
            balances: [(TOKEN.to_string(), self.balance)].into_iter().collect(),
            coin_public_key: Some("c0ffee".to_string()),
            encryption_public_key: Some("e4c".to_string()),
            address: Some("mn_addr_undeployed1".to_string()),
        });
        Ok(FakeSession {
            state,
            _sender: sender,
            calls: self.calls.clone(),
        })
    }

    fn public_data(&self) -> anyhow::Result<FakeIndexer> {
        Ok(FakeIndexer {
            apply_stage: self.apply_stage,
        })
    }

    fn proof_provider(&self) -> anyhow::Result<FakeProver> {
        Ok(FakeProver)
    }
}

struct FakeRuntime {
    faults: Faults,
    calls: Calls,
}

impl ContractRuntime for FakeRuntime {
    async fn deploy(&self, request: &DeployRequest) -> anyhow::Result<DeployOutput> {
        assert!(request.witnesses.contains("adminSecretKey"));
        let n = self.calls.deploys.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_deploy_at == Some(n) {
            anyhow::bail!("node rejected the deployment");
        }

        Ok(DeployOutput {
            transaction: LedgerTransaction::from_body(format!("deploy-{n}").into_bytes())
                .to_hex(NETWORK.ledger()),
            contract_address: ContractAddress::from(format!("0200{n:04}")),
            circuits: Vec::new(),
            private_state: serde_json::json!({}),
            signing_key: "5e".repeat(32),
        })
    }

    async fn call(&self, request: &CallRequest) -> anyhow::Result<CallOutput> {
        self.calls
            .circuit_calls
            .lock()
            .unwrap()
            .push((request.circuit.clone(), request.args.clone()));
        if self.faults.fail_calls {
            anyhow::bail!("circuit assertion failed: already initialized");
        }

        Ok(CallOutput {
            transaction: LedgerTransaction::from_body(b"call".to_vec()).to_hex(NETWORK.ledger()),
            circuits: Vec::new(),
            private_state: serde_json::json!({ "initialized": true }),
        })
    }
}

/// Write a contract "source" which is a shell script run by `/bin/sh` as the compiler.
fn write_source(dir: &Path, name: &str, compiles: bool) -> PathBuf {
    write_source_with_info(dir, name, compiles.then_some(CONTRACT_INFO_JSON))
}

/// Same as [`write_source`], emitting `contract_info` when the contract compiles.
fn write_source_with_info(dir: &Path, name: &str, contract_info: Option<&str>) -> PathBuf {
    let body = if let Some(contract_info) = contract_info {
        format!(
            "mkdir -p \"$1/contract\" \"$1/compiler\"\n\
             echo 'module.exports = {{}};' > \"$1/contract/index.cjs\"\n\
             cat > \"$1/compiler/contract-info.json\" <<'JSON'\n{contract_info}\nJSON\n"
        )
    } else {
        "echo 'error: unbound identifier' >&2\nexit 1\n".to_string()
    };

    let path = dir.join(format!("{name}.compact"));
    std::fs::write(&path, body).unwrap();
    path
}

fn contract(name: &str, init: Option<InitConfig>) -> ContractConfig {
    ContractConfig {
        name: name.to_string(),
        path: PathBuf::from(format!("{name}.compact")),
        init,
    }
}

fn config(dir: &TempDir, contracts: Vec<ContractConfig>) -> DeployConfig {
    DeployConfig {
        deployer_seed: None,
        network: NetworkConfig {
            id: NETWORK,
            ..Default::default()
        },
        toolchain: ToolchainConfig::default(),
        funding: FundingConfig {
            token: TOKEN.to_string(),
            timeout_secs: 5,
            ..Default::default()
        },
        storage: StorageConfig {
            private_state_store: "test-store".to_string(),
            private_state_dir: dir.path().join("private"),
            output: dir.path().join("deployments.json"),
        },
        contracts,
        base_dir: dir.path().to_path_buf(),
    }
}

fn pipeline(
    config: DeployConfig,
    balance: u128,
    faults: Faults,
    calls: &Calls,
) -> Pipeline<FakeNetwork, CompactCompiler, FakeRuntime> {
    Pipeline::new(
        config,
        FakeNetwork {
            balance,
            apply_stage: faults.apply_stage,
            calls: calls.clone(),
        },
        CompactCompiler::new("/bin/sh"),
        FakeRuntime {
            faults,
            calls: calls.clone(),
        },
    )
}

fn cli_seed() -> SeedInputs {
    SeedInputs {
        cli: Some(SEED.to_string()),
        ..Default::default()
    }
}

fn read_record(dir: &TempDir) -> serde_json::Value {
    let content = std::fs::read_to_string(dir.path().join("deployments.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[tokio::test]
async fn test_single_contract_without_init() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let report = pipeline(
        config(&dir, vec![contract("MyContract", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(SeedInputs {
        quick: true,
        ..Default::default()
    })
    .await
    .unwrap();

    assert_eq!(report.seed_source, SeedSource::Quick);
    assert_eq!(report.contracts.len(), 1);
    assert_eq!(report.contracts[0].init_tx, None);
    assert_eq!(
        read_record(&dir),
        serde_json::json!({ "MyContract": "02000000" })
    );
    assert!(dir.path().join("managed/MyContract/contract/index.cjs").is_file());
    assert!(
        dir.path()
            .join("private/test-store/private-states/MyContract-private.json")
            .is_file()
    );
    assert_eq!(calls.opened.load(Ordering::SeqCst), 1);
    assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_init_receives_admin_public_key() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "Passport", true);
    let calls = Calls::default();

    let init = InitConfig {
        entry_point: "initialize".to_string(),
        args: vec![InitArg {
            name: "initialAdminPk".to_string(),
            value: ArgSource::Key(KeyRef::AdminPublicKey),
        }],
    };

    let report = pipeline(
        config(&dir, vec![contract("Passport", Some(init))]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap();

    let keys = KeyPair::derive(&DeployerSeed::from_hex(SEED).unwrap()).unwrap();
    assert_eq!(report.admin_public_key, keys.public_key_hex());

    let circuit_calls = calls.circuit_calls.lock().unwrap().clone();
    assert_eq!(
        circuit_calls,
        vec![(
            "initialize".to_string(),
            vec![ArgumentValue::Bytes(keys.public_key_hex())]
        )]
    );

    let init_tx = report.contracts[0].init_tx.clone().unwrap();
    assert_eq!(init_tx, TransactionId::from("tx-1".to_string()));

    let private_state = std::fs::read_to_string(
        dir.path()
            .join("private/test-store/private-states/Passport-private.json"),
    )
    .unwrap();
    assert!(private_state.contains("initialized"));
}

#[tokio::test]
async fn test_compile_failure_never_opens_wallet() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "Broken", false);
    let calls = Calls::default();

    let err = pipeline(
        config(&dir, vec![contract("Broken", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    match err {
        DeployError::Compilation {
            contract,
            status: CompilerStatus::Exited(status),
            output,
        } => {
            assert_eq!(contract, "Broken");
            assert!(!status.success());
            assert!(output.contains("unbound identifier"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(calls.opened.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("deployments.json").exists());
}

#[tokio::test]
async fn test_second_publication_failure_writes_no_record() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "First", true);
    write_source(dir.path(), "Second", true);
    let calls = Calls::default();

    let err = pipeline(
        config(
            &dir,
            vec![contract("First", None), contract("Second", None)],
        ),
        2_000_000,
        Faults {
            fail_deploy_at: Some(1),
            ..Default::default()
        },
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    match &err {
        DeployError::Publication { contract, cause } => {
            assert_eq!(contract, "Second");
            assert!(format!("{cause:#}").contains("node rejected the deployment"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(calls.deploys.load(Ordering::SeqCst), 2);
    assert_eq!(calls.opened.load(Ordering::SeqCst), 2);
    assert_eq!(calls.closed.load(Ordering::SeqCst), 2);
    assert!(!dir.path().join("deployments.json").exists());
}

#[tokio::test]
async fn test_missing_seed_fails_before_any_stage() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let err = pipeline(
        config(&dir, vec![contract("MyContract", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(SeedInputs::default())
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::MissingSeed));
    assert!(!dir.path().join("managed").exists());
    assert_eq!(calls.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_config_seed_is_used() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let mut config = config(&dir, vec![contract("MyContract", None)]);
    config.deployer_seed = Some(SEED.to_string());

    let report = pipeline(config, 2_000_000, Faults::default(), &calls)
        .run(SeedInputs {
            env: Some("00".repeat(32)),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(report.seed_source, SeedSource::Config);
}

#[tokio::test]
async fn test_balance_at_threshold_times_out_and_closes_session() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let mut config = config(&dir, vec![contract("MyContract", None)]);
    config.funding.timeout_secs = 0;

    let err = pipeline(config, 1_000_000, Faults::default(), &calls)
        .run(cli_seed())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DeployError::FundingTimeout {
            threshold: 1_000_000,
            observed: 1_000_000,
            ..
        }
    ));
    assert_eq!(calls.deploys.load(Ordering::SeqCst), 0);
    assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_init_signature_mismatch_is_config_error() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "Passport", true);
    let calls = Calls::default();

    let init = InitConfig {
        entry_point: "initialize".to_string(),
        args: vec![InitArg {
            name: "ownerPk".to_string(),
            value: ArgSource::Key(KeyRef::AdminPublicKey),
        }],
    };

    let err = pipeline(
        config(&dir, vec![contract("Passport", Some(init))]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::Config(_)));
    assert_eq!(calls.opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_cancelled_run_stops_before_wallet() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = pipeline(
        config(&dir, vec![contract("MyContract", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .with_cancellation(cancel)
    .run(cli_seed())
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::Cancelled));
    assert_eq!(calls.opened.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("deployments.json").exists());
}

fn passport_init() -> InitConfig {
    InitConfig {
        entry_point: "initialize".to_string(),
        args: vec![InitArg {
            name: "initialAdminPk".to_string(),
            value: ArgSource::Key(KeyRef::AdminPublicKey),
        }],
    }
}

#[tokio::test]
async fn test_contract_name_with_spaces_is_recorded() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "My Contract", true);
    let calls = Calls::default();

    pipeline(
        config(&dir, vec![contract("My Contract", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap();

    assert_eq!(calls.submissions.load(Ordering::SeqCst), 1);
    assert_eq!(
        read_record(&dir),
        serde_json::json!({ "My Contract": "02000000" })
    );
    assert!(
        dir.path()
            .join("private/test-store/private-states/My%20Contract-private.json")
            .is_file()
    );
}

#[tokio::test]
async fn test_partially_applied_deployment_fails() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "MyContract", true);
    let calls = Calls::default();

    let err = pipeline(
        config(&dir, vec![contract("MyContract", None)]),
        2_000_000,
        Faults {
            apply_stage: ApplyStage::SucceedPartially,
            ..Default::default()
        },
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    match &err {
        DeployError::Publication { contract, cause } => {
            assert_eq!(contract, "MyContract");
            assert!(format!("{cause:#}").contains("SucceedPartially"), "{cause:#}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("deployments.json").exists());
}

#[tokio::test]
async fn test_init_failure_closes_session_and_writes_no_record() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source(dir.path(), "Passport", true);
    let calls = Calls::default();

    let err = pipeline(
        config(&dir, vec![contract("Passport", Some(passport_init()))]),
        2_000_000,
        Faults {
            fail_calls: true,
            ..Default::default()
        },
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    match &err {
        DeployError::Initialization {
            contract,
            entry_point,
            cause,
        } => {
            assert_eq!(contract, "Passport");
            assert_eq!(entry_point, "initialize");
            assert!(format!("{cause:#}").contains("already initialized"), "{cause:#}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(calls.deploys.load(Ordering::SeqCst), 1);
    assert_eq!(calls.opened.load(Ordering::SeqCst), 1);
    assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
    assert!(!dir.path().join("deployments.json").exists());
}

#[tokio::test]
async fn test_missing_witness_fails_before_deploy() {
    let dir = TempDir::new("nightcap-pipeline").unwrap();
    write_source_with_info(
        dir.path(),
        "Vault",
        Some(
            r#"{
    "circuits": [],
    "witnesses": [
        { "name": "adminSecretKey", "arguments": [] },
        { "name": "vaultPassword", "arguments": [] }
    ]
}"#,
        ),
    );
    let calls = Calls::default();

    let err = pipeline(
        config(&dir, vec![contract("Vault", None)]),
        2_000_000,
        Faults::default(),
        &calls,
    )
    .run(cli_seed())
    .await
    .unwrap_err();

    match &err {
        DeployError::Publication { contract, cause } => {
            assert_eq!(contract, "Vault");
            assert!(format!("{cause:#}").contains("vaultPassword"), "{cause:#}");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(calls.deploys.load(Ordering::SeqCst), 0);
    assert_eq!(calls.submissions.load(Ordering::SeqCst), 0);
    assert_eq!(calls.closed.load(Ordering::SeqCst), 1);
}
