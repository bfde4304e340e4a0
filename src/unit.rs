use std::sync::OnceLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::channel::Channel;
use crate::error::Fault;

/// Opaque handle to a loaded candidate implementation. The module/source
/// loader that materializes these is an external collaborator; the engine
/// only drives this interface.
pub trait CandidateUnit {
    /// The unit's name (source file basename without extension).
    fn name(&self) -> &str;

    /// Path of the unit's source file, used to pick the candidate's own
    /// frame out of a fault's call stack.
    fn source_file(&self) -> Option<&str> {
        None
    }

    /// Invokes a named entry point with positional arguments. Must fail
    /// with a [`crate::error::FaultKind::NotCallable`] fault when the
    /// entry point is not invocable; any fault raised by the candidate
    /// propagates unchanged.
    fn call(&mut self, entry: &str, args: &[Value], io: &mut Channel) -> Result<Value, Fault>;

    /// Source re-initialization: discards all unit state and re-executes
    /// the unit top to bottom in a fresh namespace, reading input and
    /// writing output through `io`.
    fn reset(&mut self, io: &mut Channel) -> Result<(), Fault>;

    /// The unit's visible variables, in definition order. Used by snippet
    /// tests; units that cannot expose a namespace return an empty map.
    fn namespace(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }
}

/// External collaborator that turns a file path or a source string into a
/// runnable unit. Loading executes the unit's top level, so the channel is
/// acquired for the duration.
pub trait UnitLoader {
    fn load(&self, name: &str, io: &mut Channel) -> Result<Box<dyn CandidateUnit>, Fault>;

    fn load_source(
        &self,
        name: &str,
        source: &str,
        io: &mut Channel,
    ) -> Result<Box<dyn CandidateUnit>, Fault>;
}

/// Why a candidate file name was rejected before any load attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("file name '{0}' is missing the required '.{1}' extension")]
    MissingExtension(String, String),
    #[error("'{0}' is not a valid unit name")]
    BadIdentifier(String),
    #[error("'{0}' collides with a name reserved by the execution environment")]
    ReservedName(String),
}

static NAME_PAT: OnceLock<Regex> = OnceLock::new();

fn name_pat() -> &'static Regex {
    NAME_PAT.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid pattern"))
}

/// Checks a candidate source file name before any load attempt: the
/// required extension, the restricted identifier pattern, and collision
/// with names reserved by the execution environment's standard library.
/// Returns the bare unit name.
pub fn validate_unit_name(
    file_name: &str,
    extension: &str,
    reserved: &[String],
) -> Result<String, NameError> {
    let suffix = format!(".{extension}");
    let bare = file_name.strip_suffix(&suffix).ok_or_else(|| {
        NameError::MissingExtension(file_name.to_string(), extension.to_string())
    })?;
    if !name_pat().is_match(bare) {
        return Err(NameError::BadIdentifier(file_name.to_string()));
    }
    if reserved.iter().any(|r| r == bare) {
        return Err(NameError::ReservedName(file_name.to_string()));
    }
    Ok(bare.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Vec<String> {
        vec!["json".to_string(), "math".to_string()]
    }

    #[test]
    fn accepts_plain_identifiers() {
        assert_eq!(
            validate_unit_name("my_solution.py", "py", &reserved()).unwrap(),
            "my_solution"
        );
    }

    #[test]
    fn rejects_missing_extension() {
        assert!(matches!(
            validate_unit_name("solution", "py", &reserved()),
            Err(NameError::MissingExtension(..))
        ));
    }

    #[test]
    fn rejects_bad_identifiers() {
        assert!(matches!(
            validate_unit_name("my solution.py", "py", &reserved()),
            Err(NameError::BadIdentifier(..))
        ));
        assert!(matches!(
            validate_unit_name("1st.py", "py", &reserved()),
            Err(NameError::BadIdentifier(..))
        ));
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(matches!(
            validate_unit_name("json.py", "py", &reserved()),
            Err(NameError::ReservedName(..))
        ));
    }
}
