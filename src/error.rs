use std::io;

custom_error::custom_error! { pub ReduceError
    InvalidMode{value: String} = "invalid mode '{value}', expected M1 or M2",
    InvalidThreads{value: usize} = "thread count needs to be larger than zero, got {value}",
    Malformed{line: usize, reason: String} = "malformed input at line {line}: {reason}",
    ConflictingPair{family: String, first: String, second: String, kept: f64, found: f64}
        = "family {family}: pair {first}/{second} given as both {kept} and {found}",
    MissingPair{family: String, first: String, second: String}
        = "family {family}: no KS value for pair {first}/{second}",
    MissingClusterDistance{family: String, first: String, second: String}
        = "family {family}: no stepwise KS value between clusters [{first}] and [{second}]",
    Read{path: String, source: io::Error} = "could not read {path}",
    Write{path: String, source: io::Error} = "could not write {path}",
    Json{source: serde_json::Error} = "could not serialise merge events",
}

impl ReduceError {
    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ReduceError::Malformed {
            line,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = ReduceError::malformed(7, "expected 4 tab-separated fields, found 3");
        insta::assert_snapshot!(
            err.to_string(),
            @"malformed input at line 7: expected 4 tab-separated fields, found 3"
        );

        let err = ReduceError::MissingPair {
            family: "fam1".to_string(),
            first: "G1".to_string(),
            second: "G4".to_string(),
        };
        insta::assert_snapshot!(err.to_string(), @"family fam1: no KS value for pair G1/G4");
    }

    #[test]
    fn invalid_mode_echoes_value() {
        let err = ReduceError::InvalidMode {
            value: "M3".to_string(),
        };
        assert_eq!(err.to_string(), "invalid mode 'M3', expected M1 or M2");
    }
}
