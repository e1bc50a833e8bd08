pub mod content;
pub mod diversity;
pub mod fusion;
pub mod interaction;
pub mod matrix_factorization;
pub mod profile_builder;
pub mod ranking;
pub mod recall;

pub use content::ContentScorer;
pub use diversity::DiversityLayer;
pub use fusion::RankFusion;
pub use interaction::InteractionIndex;
pub use matrix_factorization::MfModelCache;
pub use ranking::SupervisedReranker;
pub use recall::RecallLayer;
