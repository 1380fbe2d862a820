use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use fleetstock_core::DomainError;

/// Transfer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

/// Every permitted (from, to) edge.
const TRANSITIONS: &[(TransferStatus, TransferStatus)] = &[
    (TransferStatus::Pending, TransferStatus::InTransit),
    (TransferStatus::InTransit, TransferStatus::Completed),
    (TransferStatus::Pending, TransferStatus::Cancelled),
    (TransferStatus::InTransit, TransferStatus::Cancelled),
];

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(self, to: TransferStatus) -> bool {
        TRANSITIONS.contains(&(self, to))
    }

    /// Validate an edge against the transition table.
    pub fn transition_to(self, to: TransferStatus) -> Result<TransferStatus, DomainError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(DomainError::invalid_transfer_transition(self, to))
        }
    }

    /// Pending or in transit: the transfer can still be cancelled.
    pub fn is_active(self) -> bool {
        matches!(self, TransferStatus::Pending | TransferStatus::InTransit)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "in_transit" => Ok(TransferStatus::InTransit),
            "completed" => Ok(TransferStatus::Completed),
            "cancelled" => Ok(TransferStatus::Cancelled),
            other => Err(DomainError::validation(format!(
                "unknown transfer status: {other}"
            ))),
        }
    }
}
