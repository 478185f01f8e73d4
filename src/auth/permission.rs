use std::collections::BTreeSet;
use std::fmt;

use serde::{Serialize, Serializer};

/// Capabilities granted through roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    CatalogRead,
    CatalogWrite,
    InquiryRead,
    InquiryReadDepartment,
    InquiryReadAll,
    InquiryWrite,
    InquiryAssign,
    MediaWrite,
    UserManage,
    DepartmentManage,
    SalesManage,
}

impl Permission {
    pub const ALL: [Permission; 11] = [
        Permission::CatalogRead,
        Permission::CatalogWrite,
        Permission::InquiryRead,
        Permission::InquiryReadDepartment,
        Permission::InquiryReadAll,
        Permission::InquiryWrite,
        Permission::InquiryAssign,
        Permission::MediaWrite,
        Permission::UserManage,
        Permission::DepartmentManage,
        Permission::SalesManage,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Permission::CatalogRead => "catalog:read",
            Permission::CatalogWrite => "catalog:write",
            Permission::InquiryRead => "inquiry:read",
            Permission::InquiryReadDepartment => "inquiry:read_department",
            Permission::InquiryReadAll => "inquiry:read_all",
            Permission::InquiryWrite => "inquiry:write",
            Permission::InquiryAssign => "inquiry:assign",
            Permission::MediaWrite => "media:write",
            Permission::UserManage => "user:manage",
            Permission::DepartmentManage => "department:manage",
            Permission::SalesManage => "sales:manage",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code.trim())
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Effective permissions of a request principal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn all() -> Self {
        Self(Permission::ALL.iter().copied().collect())
    }

    /// Build from stored role codes; unknown codes are dropped with a warning
    pub fn from_codes<'a>(codes: impl IntoIterator<Item = &'a str>) -> Self {
        let mut set = BTreeSet::new();
        for code in codes {
            match Permission::parse(code) {
                Some(p) => {
                    set.insert(p);
                }
                None => tracing::warn!("Ignoring unknown permission code '{}'", code),
            }
        }
        Self(set)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Codes not recognized by `Permission::parse`
pub fn unknown_codes(codes: &[String]) -> Vec<String> {
    codes.iter().filter(|c| Permission::parse(c).is_none()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for p in Permission::ALL {
            assert_eq!(Permission::parse(p.code()), Some(p));
        }
    }

    #[test]
    fn unknown_codes_are_ignored() {
        let set = PermissionSet::from_codes(["catalog:read", "root:everything", "inquiry:write"]);
        assert!(set.contains(Permission::CatalogRead));
        assert!(set.contains(Permission::InquiryWrite));
        assert!(!set.contains(Permission::CatalogWrite));
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn reports_unknown_codes() {
        let codes = vec!["media:write".to_string(), "bogus".to_string()];
        assert_eq!(unknown_codes(&codes), vec!["bogus".to_string()]);
    }

    #[test]
    fn serializes_as_codes() {
        let set = PermissionSet::from_codes(["sales:manage"]);
        assert_eq!(serde_json::to_value(&set).unwrap(), serde_json::json!(["sales:manage"]));
    }
}
