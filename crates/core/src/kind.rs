use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of financial event a bank row describes. Closed set — imports
/// that match no keyword rule land on `Unknown` rather than inventing kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TransactionKind {
    #[default]
    Unknown,
    CardPurchase,
    Swish,
    Payment,
    Fee,
    Transfer,
    Deposit,
    LoanPayment,
    Interest,
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Unknown => "Unknown",
            TransactionKind::CardPurchase => "CardPurchase",
            TransactionKind::Swish => "Swish",
            TransactionKind::Payment => "Payment",
            TransactionKind::Fee => "Fee",
            TransactionKind::Transfer => "Transfer",
            TransactionKind::Deposit => "Deposit",
            TransactionKind::LoanPayment => "LoanPayment",
            TransactionKind::Interest => "Interest",
            TransactionKind::Adjustment => "Adjustment",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(TransactionKind::Unknown),
            "cardpurchase" => Ok(TransactionKind::CardPurchase),
            "swish" => Ok(TransactionKind::Swish),
            "payment" => Ok(TransactionKind::Payment),
            "fee" => Ok(TransactionKind::Fee),
            "transfer" => Ok(TransactionKind::Transfer),
            "deposit" => Ok(TransactionKind::Deposit),
            "loanpayment" => Ok(TransactionKind::LoanPayment),
            "interest" => Ok(TransactionKind::Interest),
            "adjustment" => Ok(TransactionKind::Adjustment),
            other => Err(format!("Unknown transaction kind: '{other}'")),
        }
    }
}
