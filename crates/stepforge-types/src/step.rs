use std::fmt;

/// Metered operation kinds. The names are the keys of the host's step cost table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
    ContractCall,
    Get,
    Set,
    Replace,
    Delete,
    Input,
    EventLog,
    ApiCall,
    // Fixed per-operation costs, only present in schema 1 tables.
    GetBase,
    SetBase,
    DeleteBase,
    LogBase,
    Log,
}

impl StepKind {
    pub const ALL: [StepKind; 13] = [
        StepKind::ContractCall,
        StepKind::Get,
        StepKind::Set,
        StepKind::Replace,
        StepKind::Delete,
        StepKind::Input,
        StepKind::EventLog,
        StepKind::ApiCall,
        StepKind::GetBase,
        StepKind::SetBase,
        StepKind::DeleteBase,
        StepKind::LogBase,
        StepKind::Log,
    ];

    /// Cost table key for the schema discriminant.
    pub const SCHEMA_KEY: &'static str = "schema";

    pub fn name(self) -> &'static str {
        match self {
            StepKind::ContractCall => "contractCall",
            StepKind::Get => "get",
            StepKind::Set => "set",
            StepKind::Replace => "replace",
            StepKind::Delete => "delete",
            StepKind::Input => "input",
            StepKind::EventLog => "eventLog",
            StepKind::ApiCall => "apiCall",
            StepKind::GetBase => "getBase",
            StepKind::SetBase => "setBase",
            StepKind::DeleteBase => "deleteBase",
            StepKind::LogBase => "logBase",
            StepKind::Log => "log",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.name() == name)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_roundtrip() {
        for kind in StepKind::ALL {
            assert_eq!(StepKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(StepKind::from_name("contractCreate"), None);
        assert_eq!(StepKind::from_name(StepKind::SCHEMA_KEY), None);
    }
}
