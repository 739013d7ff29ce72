//! Common types used across CLI modules

/// Hex digits in the two provider id formats (`i-` + 8 or 17)
const INSTANCE_ID_LENGTHS: [usize; 2] = [8, 17];

/// Instance argument as typed by the operator
///
/// Either a complete provider id, or a fragment that should uniquely
/// identify an instance by id prefix or display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceRef {
    /// Complete provider id such as `i-0123456789abcdef0`
    Full(String),
    /// Id prefix or display name
    Partial(String),
}

impl InstanceRef {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if is_full_instance_id(input) {
            InstanceRef::Full(input.to_string())
        } else {
            InstanceRef::Partial(input.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InstanceRef::Full(id) | InstanceRef::Partial(id) => id,
        }
    }
}

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for InstanceRef {
    fn from(s: &str) -> Self {
        InstanceRef::parse(s)
    }
}

fn is_full_instance_id(input: &str) -> bool {
    input.strip_prefix("i-").is_some_and(|hex| {
        INSTANCE_ID_LENGTHS.contains(&hex.len()) && hex.chars().all(|c| c.is_ascii_hexdigit())
    })
}
