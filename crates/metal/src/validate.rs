//! Pre-flight validation of a [`DeviceSpec`].
//!
//! Validation is pure and runs before any remote call. Rules are evaluated in
//! a fixed order: field conflicts, conditional requirements, plain required
//! fields, then enum and range checks. Messages for the first two groups
//! always contain the phrases `conflicts with` and `must be provided when`,
//! which callers match on.

use thiserror::Error;
use tracing::debug;

use crate::device::{DeviceSpec, ALLOWED_PUBLIC_IPV4_SUBNET_SIZES, CUSTOM_IPXE};
use crate::providers::BillingCycle;

/// What kind of rule a spec broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// Two fields that cannot be set together.
    Conflict { a: &'static str, b: &'static str },
    /// A field that must be set, optionally only under some condition.
    RequiredMissing {
        field: &'static str,
        condition: Option<&'static str>,
    },
    /// A value outside a fixed set of names.
    InvalidEnum { field: &'static str, value: String },
    /// A number outside the accepted set.
    InvalidRange { field: &'static str, value: u32 },
    /// A value that is not a usable URL.
    InvalidUrl { field: &'static str, value: String },
}

/// A broken validation rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    /// Rule kind, for branching.
    pub kind: ValidationErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl ValidationError {
    fn conflict(a: &'static str, b: &'static str, detail: &str) -> Self {
        Self {
            kind: ValidationErrorKind::Conflict { a, b },
            message: format!("\"{a}\": conflicts with {b}{detail}"),
        }
    }

    fn required(field: &'static str, condition: Option<&'static str>, message: String) -> Self {
        Self {
            kind: ValidationErrorKind::RequiredMissing { field, condition },
            message,
        }
    }
}

type Check = fn(&DeviceSpec) -> Option<ValidationError>;

/// Ordered rule table. The first entry that returns an error wins.
const RULES: &[(&str, Check)] = &[
    ("user_data_conflicts_with_ipxe_script_url", user_data_vs_ipxe_script_url),
    ("ipxe_script_url_requires_custom_ipxe", ipxe_script_url_requires_custom),
    ("always_pxe_requires_custom_ipxe", always_pxe_requires_custom),
    ("always_pxe_needs_boot_script", always_pxe_needs_boot_script),
    ("hostname_required", |spec| required_field("hostname", &spec.hostname)),
    ("plan_required", |spec| required_field("plan", &spec.plan)),
    ("facility_required", |spec| required_field("facility", &spec.facility)),
    ("operating_system_required", |spec| {
        required_field("operating_system", &spec.operating_system)
    }),
    ("billing_cycle_required", |spec| {
        required_field("billing_cycle", &spec.billing_cycle)
    }),
    ("project_id_required", |spec| required_field("project_id", &spec.project_id)),
    ("operating_system_slug", operating_system_slug),
    ("billing_cycle_known", billing_cycle_known),
    ("public_ipv4_subnet_size_allowed", subnet_size_allowed),
    ("ipxe_script_url_parses", ipxe_script_url_parses),
];

fn user_data_vs_ipxe_script_url(spec: &DeviceSpec) -> Option<ValidationError> {
    (spec.user_data().is_some() && spec.ipxe_script_url().is_some())
        .then(|| ValidationError::conflict("user_data", "ipxe_script_url", ""))
}

fn ipxe_script_url_requires_custom(spec: &DeviceSpec) -> Option<ValidationError> {
    (!spec.is_custom_ipxe() && spec.ipxe_script_url().is_some()).then(|| {
        ValidationError::conflict("ipxe_script_url", "operating_system", &custom_only_detail(spec))
    })
}

fn always_pxe_requires_custom(spec: &DeviceSpec) -> Option<ValidationError> {
    (!spec.is_custom_ipxe() && spec.always_pxe).then(|| {
        ValidationError::conflict("always_pxe", "operating_system", &custom_only_detail(spec))
    })
}

fn always_pxe_needs_boot_script(spec: &DeviceSpec) -> Option<ValidationError> {
    let missing = spec.ipxe_script_url().is_none() && spec.user_data().is_none();
    (spec.always_pxe && missing).then(|| {
        ValidationError::required(
            "ipxe_script_url",
            Some("always_pxe"),
            "\"ipxe_script_url\" or \"user_data\" must be provided when \"always_pxe\" is true"
                .to_string(),
        )
    })
}

fn operating_system_slug(spec: &DeviceSpec) -> Option<ValidationError> {
    (!is_slug(&spec.operating_system)).then(|| ValidationError {
        kind: ValidationErrorKind::InvalidEnum {
            field: "operating_system",
            value: spec.operating_system.clone(),
        },
        message: format!(
            "\"operating_system\": \"{}\" is not a valid operating system slug",
            spec.operating_system
        ),
    })
}

fn billing_cycle_known(spec: &DeviceSpec) -> Option<ValidationError> {
    spec.billing_cycle.parse::<BillingCycle>().is_err().then(|| {
        let known: Vec<&str> = BillingCycle::ALL.iter().map(|c| c.as_str()).collect();
        ValidationError {
            kind: ValidationErrorKind::InvalidEnum {
                field: "billing_cycle",
                value: spec.billing_cycle.clone(),
            },
            message: format!(
                "\"billing_cycle\": \"{}\" is not one of {}",
                spec.billing_cycle,
                known.join(", ")
            ),
        }
    })
}

fn subnet_size_allowed(spec: &DeviceSpec) -> Option<ValidationError> {
    let size = spec
        .public_ipv4_subnet_size
        .filter(|size| !ALLOWED_PUBLIC_IPV4_SUBNET_SIZES.contains(size))?;
    let allowed: Vec<String> = ALLOWED_PUBLIC_IPV4_SUBNET_SIZES
        .iter()
        .map(ToString::to_string)
        .collect();
    Some(ValidationError {
        kind: ValidationErrorKind::InvalidRange {
            field: "public_ipv4_subnet_size",
            value: size,
        },
        message: format!(
            "\"public_ipv4_subnet_size\": {size} is not one of {}",
            allowed.join(", ")
        ),
    })
}

fn ipxe_script_url_parses(spec: &DeviceSpec) -> Option<ValidationError> {
    let raw = spec.ipxe_script_url()?;
    let valid = url::Url::parse(raw)
        .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
    (!valid).then(|| ValidationError {
        kind: ValidationErrorKind::InvalidUrl {
            field: "ipxe_script_url",
            value: raw.to_string(),
        },
        message: format!("\"ipxe_script_url\": \"{raw}\" is not a valid http(s) URL"),
    })
}

fn custom_only_detail(spec: &DeviceSpec) -> String {
    format!(
        " \"{}\" (only valid when operating_system is \"{CUSTOM_IPXE}\")",
        spec.operating_system
    )
}

fn required_field(field: &'static str, value: &str) -> Option<ValidationError> {
    value
        .trim()
        .is_empty()
        .then(|| ValidationError::required(field, None, format!("\"{field}\" is required")))
}

fn is_slug(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' || c == '.')
}

/// Validate a spec, reporting the first broken rule.
///
/// # Errors
/// Returns the first [`ValidationError`] in rule order.
pub fn validate(spec: &DeviceSpec) -> Result<(), ValidationError> {
    for (rule, check) in RULES {
        if let Some(err) = check(spec) {
            debug!(rule, hostname = %spec.hostname, error = %err, "Device spec rejected");
            return Err(err);
        }
    }
    Ok(())
}

/// Validate a spec, reporting every broken rule in rule order.
#[must_use]
pub fn validate_all(spec: &DeviceSpec) -> Vec<ValidationError> {
    RULES.iter().filter_map(|(_, check)| check(spec)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock() -> DeviceSpec {
        DeviceSpec::new(
            "test-device",
            "baremetal_0",
            "sjc1",
            "ubuntu_16_04",
            "hourly",
            "p1",
        )
    }

    fn custom() -> DeviceSpec {
        DeviceSpec {
            operating_system: CUSTOM_IPXE.to_string(),
            ..stock()
        }
    }

    #[test]
    fn test_stock_spec_is_valid() {
        assert_eq!(validate(&stock()), Ok(()));
        assert_eq!(validate(&stock().with_subnet_size(29)), Ok(()));
    }

    #[test]
    fn test_custom_ipxe_with_url_is_valid() {
        let spec = custom()
            .with_ipxe_script_url("https://boot.netboot.xyz")
            .with_always_pxe(true);
        assert_eq!(validate(&spec), Ok(()));
    }

    #[test]
    fn test_always_pxe_with_inline_script_is_valid() {
        let spec = custom()
            .with_user_data("#!ipxe\nchain https://boot.netboot.xyz")
            .with_always_pxe(true);
        assert_eq!(validate(&spec), Ok(()));
    }

    #[test]
    fn test_user_data_and_url_conflict() {
        let spec = custom()
            .with_user_data("#!ipxe\nset conflict ipxe_script_url")
            .with_ipxe_script_url("https://boot.netboot.xyz")
            .with_always_pxe(true);
        let err = validate(&spec).unwrap_err();
        assert!(err.to_string().contains("conflicts with"));
        assert_eq!(
            err.kind,
            ValidationErrorKind::Conflict {
                a: "user_data",
                b: "ipxe_script_url"
            }
        );
    }

    #[test]
    fn test_conflict_wins_regardless_of_other_fields() {
        let spec = DeviceSpec {
            hostname: String::new(),
            billing_cycle: "fortnightly".to_string(),
            public_ipv4_subnet_size: Some(7),
            ..stock()
        }
        .with_user_data("x")
        .with_ipxe_script_url("not a url");
        assert!(validate(&spec)
            .unwrap_err()
            .to_string()
            .contains("conflicts with"));
    }

    #[test]
    fn test_custom_only_fields_on_stock_os() {
        let err = validate(&stock().with_ipxe_script_url("https://boot.netboot.xyz")).unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::Conflict {
                a: "ipxe_script_url",
                ..
            }
        ));
        assert!(err.to_string().contains("conflicts with"));

        let err = validate(&stock().with_always_pxe(true)).unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::Conflict {
                a: "always_pxe",
                ..
            }
        ));
    }

    #[test]
    fn test_always_pxe_needs_script() {
        let err = validate(&custom().with_always_pxe(true)).unwrap_err();
        assert!(err.to_string().contains("must be provided when"));
        assert_eq!(
            err.kind,
            ValidationErrorKind::RequiredMissing {
                field: "ipxe_script_url",
                condition: Some("always_pxe"),
            }
        );

        // Empty strings count as unset.
        let spec = custom()
            .with_always_pxe(true)
            .with_user_data("")
            .with_ipxe_script_url("");
        assert!(validate(&spec)
            .unwrap_err()
            .to_string()
            .contains("must be provided when"));
    }

    #[test]
    fn test_enum_and_range_checks() {
        let err = validate(&DeviceSpec {
            billing_cycle: "fortnightly".to_string(),
            ..stock()
        })
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::InvalidEnum {
                field: "billing_cycle",
                ..
            }
        ));

        let err = validate(&stock().with_subnet_size(27)).unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::InvalidRange {
                field: "public_ipv4_subnet_size",
                value: 27
            }
        );

        let err = validate(&DeviceSpec {
            operating_system: "Ubuntu 16.04".to_string(),
            ..stock()
        })
        .unwrap_err();
        assert!(matches!(
            err.kind,
            ValidationErrorKind::InvalidEnum {
                field: "operating_system",
                ..
            }
        ));
    }

    #[test]
    fn test_ipxe_url_must_be_http() {
        let err = validate(&custom().with_ipxe_script_url("ftp://boot.example.com/x")).unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::InvalidUrl { .. }));
    }

    #[test]
    fn test_required_fields() {
        let err = validate(&DeviceSpec {
            project_id: " ".to_string(),
            ..stock()
        })
        .unwrap_err();
        assert_eq!(
            err.kind,
            ValidationErrorKind::RequiredMissing {
                field: "project_id",
                condition: None
            }
        );
    }

    #[test]
    fn test_validate_all_collects_in_order() {
        let spec = DeviceSpec {
            hostname: String::new(),
            ..custom()
        }
        .with_always_pxe(true)
        .with_subnet_size(20);
        let errors = validate_all(&spec);
        assert_eq!(errors.len(), 3);
        assert!(errors[0].to_string().contains("must be provided when"));
        assert!(matches!(
            errors[1].kind,
            ValidationErrorKind::RequiredMissing {
                field: "hostname",
                ..
            }
        ));
        assert!(matches!(
            errors[2].kind,
            ValidationErrorKind::InvalidRange { .. }
        ));
    }
}
