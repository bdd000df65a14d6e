//! Post-deployment initialization calls.

use crate::{
    compiler::{ArgumentType, CompiledArtifact},
    config::{ArgSource, InitConfig, KeyRef},
    contract::DeployedContract,
    error::{DeployError, Result},
    keys::KeyPair,
    providers::{Network, ProviderBundle},
    runtime::{ArgumentValue, ContractRuntime, WitnessSet},
    tx::TransactionId,
};

/// An initialization call with its arguments resolved against the run's key pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPlan {
    pub entry_point: String,
    /// Arguments in call order.
    pub args: Vec<(String, ArgumentValue)>,
}

impl InitPlan {
    pub fn resolve(init: &InitConfig, keys: &KeyPair) -> Result<Self> {
        let args = init
            .args
            .iter()
            .map(|arg| {
                let value = match &arg.value {
                    ArgSource::Key(KeyRef::AdminPublicKey) => {
                        ArgumentValue::Bytes(hex::encode(keys.public_key))
                    }
                    ArgSource::Key(KeyRef::AdminPrivateKey) => {
                        ArgumentValue::Bytes(hex::encode(keys.private_key))
                    }
                    ArgSource::Bytes(value) => {
                        let bytes = hex::decode(value.trim_start_matches("0x")).map_err(|e| {
                            DeployError::config(format!(
                                "Init argument '{}' is not valid hex: {}",
                                arg.name, e
                            ))
                        })?;
                        ArgumentValue::Bytes(hex::encode(bytes))
                    }
                    ArgSource::Uint(n) => ArgumentValue::Uint(*n),
                    ArgSource::Bool(b) => ArgumentValue::Bool(*b),
                    ArgSource::Text(s) => ArgumentValue::Text(s.clone()),
                };
                Ok((arg.name.clone(), value))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entry_point: init.entry_point.clone(),
            args,
        })
    }

    /// Positional argument values.
    pub fn values(&self) -> Vec<ArgumentValue> {
        self.args.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// Check an init declaration against the circuits of the compiled contract.
///
/// The entry point must exist and be impure, and the arguments must match the declared
/// parameters by name, position and kind.
pub fn validate_signature(init: &InitConfig, artifact: &CompiledArtifact) -> Result<()> {
    let fail = |msg: String| {
        DeployError::config(format!(
            "Contract '{}', entry point '{}': {}",
            artifact.name, init.entry_point, msg
        ))
    };

    let circuit = artifact
        .circuit(&init.entry_point)
        .ok_or_else(|| fail("no such circuit".to_string()))?;

    if circuit.pure {
        return Err(fail("pure circuits cannot be called as transactions".to_string()));
    }

    if circuit.arguments.len() != init.args.len() {
        return Err(fail(format!(
            "expected {} arguments, got {}",
            circuit.arguments.len(),
            init.args.len()
        )));
    }

    for (position, (declared, given)) in circuit.arguments.iter().zip(&init.args).enumerate() {
        if declared.name != given.name {
            return Err(fail(format!(
                "argument {} is '{}', got '{}'",
                position, declared.name, given.name
            )));
        }

        if !accepts(&declared.ty, &given.value) {
            return Err(fail(format!(
                "argument '{}' of type {:?} cannot take {:?}",
                declared.name, declared.ty, given.value
            )));
        }
    }

    Ok(())
}

fn accepts(ty: &ArgumentType, value: &ArgSource) -> bool {
    match (ty, value) {
        (ArgumentType::Bytes { length }, ArgSource::Key(_)) => *length == 32,
        (ArgumentType::Bytes { length }, ArgSource::Bytes(hex_value)) => hex::decode(
            hex_value.trim_start_matches("0x"),
        )
        .map(|bytes| bytes.len() == *length)
        .unwrap_or(false),
        (ArgumentType::Uint | ArgumentType::Field, ArgSource::Uint(_)) => true,
        (ArgumentType::Boolean, ArgSource::Bool(_)) => true,
        (ArgumentType::Opaque { ts_type }, ArgSource::Text(_)) => ts_type == "string",
        // Types the compiler reports that have no config syntax are left to the runtime.
        (ArgumentType::Other, _) => true,
        _ => false,
    }
}

/// Call the init entry point on a freshly deployed contract.
pub async fn initialize<N, R>(
    contract: &DeployedContract,
    bundle: &ProviderBundle<'_, N>,
    runtime: &R,
    plan: &InitPlan,
    witnesses: &WitnessSet,
) -> Result<TransactionId>
where
    N: Network,
    R: ContractRuntime,
{
    tracing::debug!(
        contract = %contract.name,
        entry_point = %plan.entry_point,
        args = ?plan.args.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
        "Calling init entry point"
    );

    contract
        .call(bundle, runtime, &plan.entry_point, plan.values(), witnesses)
        .await
        .map(|data| data.tx_id)
        .map_err(|e| DeployError::initialization(&contract.name, &plan.entry_point, e))
}
