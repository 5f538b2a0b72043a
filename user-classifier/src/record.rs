use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One aggregate data point about an entity, as received from the input topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub entity_id: String,
    pub total: f64,
    pub count: u64,
}

/// The latest aggregate known for an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: String,
    pub total: f64,
    pub count: u64,
}

impl From<Observation> for EntityState {
    fn from(observation: Observation) -> Self {
        Self {
            entity_id: observation.entity_id,
            total: observation.total,
            count: observation.count,
        }
    }
}

/// The group an entity was placed in by one classification cycle. Labels are only
/// meaningful within the cycle that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub entity_id: String,
    pub total: f64,
    pub count: u64,
    pub label: usize,
}

impl ClusterAssignment {
    pub fn new(state: &EntityState, label: usize) -> Self {
        Self {
            entity_id: state.entity_id.clone(),
            total: state.total,
            count: state.count,
            label,
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("user_id is empty")]
    EmptyEntityId,
    #[error("num_transactions is negative: {0}")]
    NegativeCount(i64),
    #[error("total_amount is not a finite number: {0}")]
    NonFiniteTotal(f64),
}

/// Value of a record on the input topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionsAggregate {
    pub user_id: String,
    pub total_amount: f64,
    pub num_transactions: i64,
}

impl TryFrom<TransactionsAggregate> for Observation {
    type Error = RecordError;

    fn try_from(record: TransactionsAggregate) -> Result<Self, Self::Error> {
        if record.user_id.is_empty() {
            return Err(RecordError::EmptyEntityId);
        }
        if !record.total_amount.is_finite() {
            return Err(RecordError::NonFiniteTotal(record.total_amount));
        }
        let count = u64::try_from(record.num_transactions)
            .map_err(|_| RecordError::NegativeCount(record.num_transactions))?;

        Ok(Observation {
            entity_id: record.user_id,
            total: record.total_amount,
            count,
        })
    }
}

/// Value of a record on the output topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserLabeling {
    pub user_id: String,
    pub total_amount: f64,
    pub num_transactions: i64,
    pub label: i64,
}

impl From<&ClusterAssignment> for UserLabeling {
    fn from(assignment: &ClusterAssignment) -> Self {
        Self {
            user_id: assignment.entity_id.clone(),
            total_amount: assignment.total,
            num_transactions: i64::try_from(assignment.count).unwrap_or(i64::MAX),
            label: i64::try_from(assignment.label).unwrap_or(i64::MAX),
        }
    }
}
