use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::ConflictError, transaction::TransactionId};

pub type RefundId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for RefundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RefundStatus::Pending => "pending",
            RefundStatus::Approved => "approved",
            RefundStatus::Rejected => "rejected",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefundRequest {
    pub id: RefundId,
    pub transaction_id: TransactionId,
    pub reason: String,
    status: RefundStatus,
    pub resolution_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RefundRequest {
    pub fn new(transaction_id: TransactionId, reason: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            reason,
            status: RefundStatus::Pending,
            resolution_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> RefundStatus {
        self.status
    }

    /// Single shot, a resolved request never changes again.
    pub fn resolve(
        &mut self,
        decision: Decision,
        reason: String,
    ) -> Result<RefundStatus, ConflictError> {
        if self.status != RefundStatus::Pending {
            return Err(ConflictError::RefundAlreadyResolved {
                request: self.id,
                status: self.status,
            });
        }
        self.status = match decision {
            Decision::Approve => RefundStatus::Approved,
            Decision::Reject => RefundStatus::Rejected,
        };
        self.resolution_reason = Some(reason);
        self.updated_at = Utc::now();
        Ok(self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_once() {
        let mut request = RefundRequest::new(Uuid::new_v4(), "wrong wallet".to_string());
        assert_eq!(
            request.resolve(Decision::Reject, "no".to_string()).unwrap(),
            RefundStatus::Rejected
        );
        let err = request
            .resolve(Decision::Approve, "changed my mind".to_string())
            .unwrap_err();
        assert!(matches!(
            err,
            ConflictError::RefundAlreadyResolved {
                status: RefundStatus::Rejected,
                ..
            }
        ));
        assert_eq!(request.status(), RefundStatus::Rejected);
        assert_eq!(request.resolution_reason.as_deref(), Some("no"));
    }
}
