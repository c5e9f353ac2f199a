//! Simulation scenarios.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ledgerbank_ledger::StoreOperation;

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario. Amounts are decimal strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Post a deposit.
    Deposit { account: String, amount: String },
    /// Post a withdrawal.
    Withdraw { account: String, amount: String },
    /// Transfer between two accounts. `label` names the transfer for later
    /// assertions.
    Transfer {
        label: Option<String>,
        from: String,
        to: String,
        amount: String,
        currency: String,
    },
    /// Make the next call of a store operation fail.
    InjectFault { fault: Fault },
    /// Clear pending faults.
    ClearFaults,
    /// Pause.
    Wait { millis: u64 },
    /// Check a condition.
    Assert { condition: AssertCondition },
}

/// Store operations a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    FindAccount,
    InsertExchangeRate,
    FindExchangeRate,
    InsertTransaction,
    InsertTransfer,
    InsertTransferLegs,
    UpdateTransferStatus,
}

impl Fault {
    /// The store operation this fault fails.
    pub fn operation(self) -> StoreOperation {
        match self {
            Fault::FindAccount => StoreOperation::FindAccount,
            Fault::InsertExchangeRate => StoreOperation::InsertExchangeRate,
            Fault::FindExchangeRate => StoreOperation::FindExchangeRate,
            Fault::InsertTransaction => StoreOperation::InsertTransaction,
            Fault::InsertTransfer => StoreOperation::InsertTransfer,
            Fault::InsertTransferLegs => StoreOperation::InsertTransferLegs,
            Fault::UpdateTransferStatus => StoreOperation::UpdateTransferStatus,
        }
    }
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum AssertCondition {
    /// Account balance equals `amount`.
    BalanceEquals { account: String, amount: String },
    /// The labelled transfer settled.
    TransferSucceeded { label: String },
    /// The labelled transfer was recorded but did not settle.
    TransferFailed { label: String },
    /// The labelled transfer was rejected before anything was recorded.
    TransferRejected { label: String },
    /// Every balance equals the sum of its signed transactions.
    LedgerConsistent,
}

impl Scenario {
    /// Load a built-in scenario by name, or a JSON scenario file by path.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        match name {
            "simple-transfer" => Ok(Self::simple_transfer()),
            "leg-failure" => Ok(Self::leg_failure()),
            "record-failure" => Ok(Self::record_failure()),
            "status-failure" => Ok(Self::status_failure()),
            "self-transfer" => Ok(Self::self_transfer()),
            path if path.ends_with(".json") => Self::from_file(path),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (built-in: {})",
                name,
                Self::builtin_names().join(", ")
            )),
        }
    }

    /// Names of the built-in scenarios.
    pub fn builtin_names() -> &'static [&'static str] {
        &[
            "simple-transfer",
            "leg-failure",
            "record-failure",
            "status-failure",
            "self-transfer",
        ]
    }

    fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Deposit, then move part of it to a second account.
    fn simple_transfer() -> Self {
        Self {
            name: "simple-transfer".to_string(),
            description: "Deposit and a settled transfer between two accounts".to_string(),
            steps: vec![
                deposit("1001", "500"),
                transfer("t1", "1001", "1002", "120"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferSucceeded {
                        label: "t1".to_string(),
                    },
                },
                balance_equals("1001", "380"),
                balance_equals("1002", "120"),
                consistent(),
            ],
        }
    }

    /// The leg pair fails; balances stay put and the intent is kept.
    fn leg_failure() -> Self {
        Self {
            name: "leg-failure".to_string(),
            description: "Leg pair write fails and rolls back".to_string(),
            steps: vec![
                deposit("1001", "500"),
                ScenarioStep::InjectFault {
                    fault: Fault::InsertTransferLegs,
                },
                transfer("t1", "1001", "1002", "200"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferFailed {
                        label: "t1".to_string(),
                    },
                },
                balance_equals("1001", "500"),
                balance_equals("1002", "0"),
                // Nothing is retried; a new transfer goes through.
                transfer("t2", "1001", "1002", "200"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferSucceeded {
                        label: "t2".to_string(),
                    },
                },
                balance_equals("1001", "300"),
                consistent(),
            ],
        }
    }

    /// The intent record cannot be written, so nothing is attempted.
    fn record_failure() -> Self {
        Self {
            name: "record-failure".to_string(),
            description: "Transfer intent cannot be recorded".to_string(),
            steps: vec![
                deposit("1001", "500"),
                ScenarioStep::InjectFault {
                    fault: Fault::InsertTransfer,
                },
                transfer("t1", "1001", "1002", "50"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferRejected {
                        label: "t1".to_string(),
                    },
                },
                balance_equals("1001", "500"),
                consistent(),
            ],
        }
    }

    /// Legs commit but the status update fails.
    fn status_failure() -> Self {
        Self {
            name: "status-failure".to_string(),
            description: "Legs commit, status update fails".to_string(),
            steps: vec![
                deposit("1001", "500"),
                ScenarioStep::InjectFault {
                    fault: Fault::UpdateTransferStatus,
                },
                transfer("t1", "1001", "1002", "75"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferFailed {
                        label: "t1".to_string(),
                    },
                },
                balance_equals("1001", "425"),
                balance_equals("1002", "75"),
                consistent(),
            ],
        }
    }

    /// Transfer to the same account nets to zero.
    fn self_transfer() -> Self {
        Self {
            name: "self-transfer".to_string(),
            description: "Self-transfer records two legs and nets to zero".to_string(),
            steps: vec![
                deposit("1001", "100"),
                transfer("t1", "1001", "1001", "40"),
                ScenarioStep::Assert {
                    condition: AssertCondition::TransferSucceeded {
                        label: "t1".to_string(),
                    },
                },
                balance_equals("1001", "100"),
                ScenarioStep::Withdraw {
                    account: "1001".to_string(),
                    amount: "150".to_string(),
                },
                ScenarioStep::Wait { millis: 10 },
                balance_equals("1001", "-50"),
                consistent(),
            ],
        }
    }
}

fn deposit(account: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Deposit {
        account: account.to_string(),
        amount: amount.to_string(),
    }
}

fn transfer(label: &str, from: &str, to: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Transfer {
        label: Some(label.to_string()),
        from: from.to_string(),
        to: to.to_string(),
        amount: amount.to_string(),
        currency: "USD".to_string(),
    }
}

fn balance_equals(account: &str, amount: &str) -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::BalanceEquals {
            account: account.to_string(),
            amount: amount.to_string(),
        },
    }
}

fn consistent() -> ScenarioStep {
    ScenarioStep::Assert {
        condition: AssertCondition::LedgerConsistent,
    }
}
