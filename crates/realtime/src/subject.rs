//! Realtime subjects: `<entity>.<event>[.<scope_kind>].<scope_id>`.

use core::str::FromStr;

use coopdesk_core::ApiError;

/// A validated, dot-delimited pub/sub subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Subject(String);

impl Subject {
    /// Start a subject from an entity and an event kind, e.g. `branch.update`.
    pub fn new(entity: &str, event: &str) -> Result<Self, ApiError> {
        validate_token(entity)?;
        validate_token(event)?;
        Ok(Self(format!("{entity}.{event}")))
    }

    /// Append a scope kind and id, e.g. `.organization.7`.
    pub fn scoped(self, scope_kind: &str, scope_id: impl core::fmt::Display) -> Result<Self, ApiError> {
        validate_token(scope_kind)?;
        self.id(scope_id).map(|s| s.insert_before_last(scope_kind))
    }

    /// Append a bare id, e.g. `.42`.
    pub fn id(self, scope_id: impl core::fmt::Display) -> Result<Self, ApiError> {
        let scope_id = scope_id.to_string();
        validate_token(&scope_id)?;
        Ok(Self(format!("{}.{scope_id}", self.0)))
    }

    fn insert_before_last(self, token: &str) -> Self {
        match self.0.rsplit_once('.') {
            Some((head, last)) => Self(format!("{head}.{token}.{last}")),
            None => self,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// The leading entity token (`branch` in `branch.update.42`).
    pub fn entity(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

fn validate_token(token: &str) -> Result<(), ApiError> {
    if token.is_empty() {
        return Err(ApiError::precondition("subject tokens must not be empty"));
    }
    if token
        .chars()
        .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace())
    {
        return Err(ApiError::precondition(format!("invalid subject token: {token:?}")));
    }
    Ok(())
}

impl FromStr for Subject {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut count = 0;
        for token in s.split('.') {
            validate_token(token)?;
            count += 1;
        }
        if count < 2 {
            return Err(ApiError::precondition(format!(
                "subject needs at least an entity and an event: {s:?}"
            )));
        }
        Ok(Self(s.to_string()))
    }
}

impl core::fmt::Display for Subject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_id_scoped_subject() {
        let s = Subject::new("branch", "update").unwrap().id(42).unwrap();
        assert_eq!(s.as_str(), "branch.update.42");
        assert_eq!(s.entity(), "branch");
    }

    #[test]
    fn builds_kind_scoped_subject() {
        let s = Subject::new("member", "create")
            .unwrap()
            .scoped("branch", "7")
            .unwrap();
        assert_eq!(s.as_str(), "member.create.branch.7");
        assert_eq!(s.tokens().count(), 4);
    }

    #[test]
    fn rejects_wildcards_and_blank_tokens() {
        assert!(Subject::new("branch", "").is_err());
        assert!(Subject::new("bran ch", "update").is_err());
        assert!("branch.*".parse::<Subject>().is_err());
        assert!("branch..42".parse::<Subject>().is_err());
        assert!("branch".parse::<Subject>().is_err());
    }

    #[test]
    fn parse_round_trips_display() {
        let s: Subject = "loan.approve.organization.3".parse().unwrap();
        assert_eq!(s.to_string(), "loan.approve.organization.3");
    }
}
