//! Parsing of `info.json` dependency strings
//!
//! Format: `[prefix] name [op version]`, where prefix is one of `!`, `?`,
//! `(?)` or `~`, and op is one of `<`, `<=`, `=`, `>=`, `>`.

use regex_lite::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static DEPENDENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(\(\?\)|[!?~])?\s*([A-Za-z0-9_-][A-Za-z0-9_ .-]*[A-Za-z0-9_-]|[A-Za-z0-9_-])\s*(?:(<=|>=|=|<|>)\s*(\d+(?:\.\d+){1,2}))?\s*$",
    )
    .expect("dependency pattern is valid")
});

/// How a dependency constrains the depending mod.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Required,
    Optional,
    HiddenOptional,
    Incompatible,
    /// Required, but does not affect load order (`~`).
    NoLoadOrder,
}

impl DependencyKind {
    pub fn is_required(&self) -> bool {
        matches!(self, DependencyKind::Required | DependencyKind::NoLoadOrder)
    }

    fn prefix(&self) -> &'static str {
        match self {
            DependencyKind::Required => "",
            DependencyKind::Optional => "? ",
            DependencyKind::HiddenOptional => "(?) ",
            DependencyKind::Incompatible => "! ",
            DependencyKind::NoLoadOrder => "~ ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionOp {
    Less,
    LessOrEqual,
    Equal,
    GreaterOrEqual,
    Greater,
}

impl VersionOp {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(VersionOp::Less),
            "<=" => Some(VersionOp::LessOrEqual),
            "=" => Some(VersionOp::Equal),
            ">=" => Some(VersionOp::GreaterOrEqual),
            ">" => Some(VersionOp::Greater),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VersionOp::Less => "<",
            VersionOp::LessOrEqual => "<=",
            VersionOp::Equal => "=",
            VersionOp::GreaterOrEqual => ">=",
            VersionOp::Greater => ">",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    pub op: VersionOp,
    pub version: String,
}

impl VersionRequirement {
    /// Compare dotted numeric versions; missing components count as zero.
    pub fn matches(&self, version: &str) -> bool {
        let ordering = compare_versions(version, &self.version);
        match self.op {
            VersionOp::Less => ordering.is_lt(),
            VersionOp::LessOrEqual => ordering.is_le(),
            VersionOp::Equal => ordering.is_eq(),
            VersionOp::GreaterOrEqual => ordering.is_ge(),
            VersionOp::Greater => ordering.is_gt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub kind: DependencyKind,
    pub name: String,
    pub requirement: Option<VersionRequirement>,
}

impl Dependency {
    /// `base` is the game itself and is never on the portal.
    pub fn is_base_game(&self) -> bool {
        self.name == "base"
    }
}

impl FromStr for Dependency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = DEPENDENCY_RE
            .captures(s)
            .ok_or_else(|| format!("Invalid dependency string: '{}'", s))?;

        let kind = match caps.get(1).map(|m| m.as_str()) {
            None => DependencyKind::Required,
            Some("?") => DependencyKind::Optional,
            Some("(?)") => DependencyKind::HiddenOptional,
            Some("!") => DependencyKind::Incompatible,
            Some("~") => DependencyKind::NoLoadOrder,
            Some(other) => return Err(format!("Unknown dependency prefix: '{}'", other)),
        };

        let name = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .ok_or_else(|| format!("Missing dependency name in '{}'", s))?;

        let requirement = match (caps.get(3), caps.get(4)) {
            (Some(op), Some(version)) => Some(VersionRequirement {
                op: VersionOp::parse(op.as_str())
                    .ok_or_else(|| format!("Unknown version operator: '{}'", op.as_str()))?,
                version: version.as_str().to_string(),
            }),
            _ => None,
        };

        Ok(Dependency {
            kind,
            name,
            requirement,
        })
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.name)?;
        if let Some(req) = &self.requirement {
            write!(f, " {} {}", req.op.as_str(), req.version)?;
        }
        Ok(())
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split('.')
            .map(|part| part.trim().parse::<u64>().unwrap_or(0))
            .collect()
    };
    let (a, b) = (parse(a), parse(b));
    let len = a.len().max(b.len());
    for i in 0..len {
        let left = a.get(i).copied().unwrap_or(0);
        let right = b.get(i).copied().unwrap_or(0);
        match left.cmp(&right) {
            std::cmp::Ordering::Equal => continue,
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_required_without_version() {
        let dep: Dependency = "base".parse().unwrap();
        assert_eq!(dep.name, "base");
        assert_eq!(dep.kind, DependencyKind::Required);
        assert!(dep.requirement.is_none());
        assert!(dep.is_base_game());
    }

    #[test]
    fn test_parse_prefixes() {
        let optional: Dependency = "? bobores".parse().unwrap();
        assert_eq!(optional.kind, DependencyKind::Optional);

        let hidden: Dependency = "(?) bobwarfare".parse().unwrap();
        assert_eq!(hidden.kind, DependencyKind::HiddenOptional);
        assert_eq!(hidden.name, "bobwarfare");

        let incompatible: Dependency = "! angelspetrochem".parse().unwrap();
        assert_eq!(incompatible.kind, DependencyKind::Incompatible);

        let no_order: Dependency = "~ boblibrary >= 1.1.0".parse().unwrap();
        assert_eq!(no_order.kind, DependencyKind::NoLoadOrder);
        assert!(no_order.kind.is_required());
    }

    #[test]
    fn test_parse_version_requirement() {
        let dep: Dependency = "boblibrary >= 1.1.5".parse().unwrap();
        let req = dep.requirement.unwrap();
        assert_eq!(req.op, VersionOp::GreaterOrEqual);
        assert_eq!(req.version, "1.1.5");
        assert!(req.matches("1.1.5"));
        assert!(req.matches("1.2.0"));
        assert!(!req.matches("1.1.4"));
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let dep: Dependency = "? Krastorio 2".parse().unwrap();
        assert_eq!(dep.name, "Krastorio 2");
        assert_eq!(dep.kind, DependencyKind::Optional);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Dependency>().is_err());
        assert!(">= 1.0.0".parse::<Dependency>().is_err());
    }

    #[test]
    fn test_display_round_trips_shape() {
        let dep: Dependency = "?   bobores   <  2.0".parse().unwrap();
        assert_eq!(dep.to_string(), "? bobores < 2.0");
    }

    #[test]
    fn test_compare_versions_pads_missing_parts() {
        assert!(compare_versions("1.1", "1.1.0").is_eq());
        assert!(compare_versions("1.10.0", "1.9.9").is_gt());
    }
}
