pub mod dedup;
pub mod detection;
pub mod extract;
pub mod parser;
pub mod profile;
/// Format decoders that turn uploaded bytes into `RawData`.
pub mod readers;
pub mod registry;
pub mod similarity;
pub(crate) mod util;

pub use dedup::{remove_duplicates, remove_duplicates_with, DuplicatePolicy};
pub use detection::{
    calculate_metrics, calculate_score, detect_best_parser, test_parser, NO_COMPATIBLE_PARSER,
    NO_PARSER_MATCHED,
};
pub use extract::{extract_transactions, Extraction};
pub use parser::{ParserError, StatementParser};
pub use profile::{parse_amount, ParserProfile, ProfileParser};
pub use readers::{read, ReadError};
pub use registry::{group_by_file_type, ParserGroups, ParserRegistry};
pub use similarity::{normalize, similarity, Similarity};

pub mod import {
    use crate::*;

    /// Build a registry from column profiles, failing on the first bad one.
    pub fn registry_from_profiles(
        profiles: impl IntoIterator<Item = ParserProfile>,
    ) -> Result<ParserRegistry, ParserError> {
        let mut registry = ParserRegistry::new();
        for profile in profiles {
            registry.register(ProfileParser::new(profile)?);
        }
        Ok(registry)
    }
}
