use std::fmt;

/// The deserialization stream ended early or contained an invalid encoding.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SerdeErr;

impl fmt::Display for SerdeErr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "bit deserialization error")
    }
}

impl std::error::Error for SerdeErr {}
