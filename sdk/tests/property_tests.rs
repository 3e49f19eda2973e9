use proptest::prelude::*;
use sdk::errors::{CadreErrorExt, EngineError};
use sdk::types::Complexity;
use std::path::PathBuf;

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*") {
        // Every variant must produce a non-empty hint that never echoes its payload
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::InvalidTask(error_str.clone()),
            EngineError::UnknownRole(error_str.clone()),
            EngineError::NoDefinitionsLoaded(error_str.clone()),
            EngineError::CacheIo(error_str.clone()),
            EngineError::PathRejected {
                path: PathBuf::from(&error_str),
                violations: vec![error_str.clone()],
            },
        ];

        for err in errs {
            let hint = err.user_hint();
            prop_assert!(!hint.is_empty());
            if error_str.len() > 12 {
                prop_assert!(!hint.contains(error_str.as_str()));
            }
        }
    }

    #[test]
    fn test_complexity_parse_is_case_insensitive(
        name in "simple|medium|complex",
        upper in proptest::bool::ANY,
    ) {
        let input = if upper { name.to_uppercase() } else { name.clone() };
        let parsed: Complexity = input.parse().expect("known complexity");
        prop_assert_eq!(parsed.as_str(), name.as_str());
    }
}
