use crate::error::DaemonResult;
use crate::sys;

/// A system user, given either by name or by numeric id.
#[derive(Debug, Clone)]
pub struct User(pub String);

/// A system group, given either by name or by numeric id.
#[derive(Debug, Clone)]
pub struct Group(pub String);

impl User {
    /// Resolves to a numeric uid, consulting the passwd database for names.
    pub fn uid(&self) -> DaemonResult<u32> {
        match self.0.parse::<u32>() {
            Ok(id) => Ok(id),
            Err(_) => sys::uid_of_name(&self.0),
        }
    }
}

impl Group {
    /// Resolves to a numeric gid, consulting the group database for names.
    pub fn gid(&self) -> DaemonResult<u32> {
        match self.0.parse::<u32>() {
            Ok(id) => Ok(id),
            Err(_) => sys::gid_of_name(&self.0),
        }
    }
}

impl From<&str> for User {
    fn from(s: &str) -> Self {
        User(s.to_owned())
    }
}

impl From<u32> for User {
    fn from(id: u32) -> Self {
        User(id.to_string())
    }
}

impl From<&str> for Group {
    fn from(s: &str) -> Self {
        Group(s.to_owned())
    }
}

impl From<u32> for Group {
    fn from(id: u32) -> Self {
        Group(id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_user_resolves_without_lookup() {
        assert_eq!(User::from(1000).uid().unwrap(), 1000);
        assert_eq!(Group::from("42").gid().unwrap(), 42);
    }

    #[test]
    fn root_resolves_by_name() {
        assert_eq!(User::from("root").uid().unwrap(), 0);
        assert_eq!(Group::from("root").gid().unwrap(), 0);
    }
}
