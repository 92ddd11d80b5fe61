pub mod category;
pub mod kind;
pub mod normalize;
pub mod signature;
pub mod transaction;

pub use category::{Category, CategoryError, CategoryGroup, SEED_CATEGORIES, SEED_GROUPS};
pub use kind::TransactionKind;
pub use normalize::{normalize_header, normalize_matching, normalize_text};
pub use signature::{
    DescriptionSignature, SignatureHeuristics, SignatureSource, AUTO_CONFIDENCE_THRESHOLD,
};
pub use transaction::{Fingerprint, ParsedTransaction};
