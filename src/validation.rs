use crate::errors::ValidationError;
use crate::file::SourceFile;
use crate::labels::LabelLookup;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Acceptance rules applied to every candidate file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationRules {
    pub accept: Option<Vec<String>>,
    pub max_size_mb: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected { error: ValidationError, reason: String },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// A rejected candidate, as handed to the invalid-files callback.
#[derive(Debug, Clone)]
pub struct InvalidFile {
    pub file: SourceFile,
    pub reason: String,
    pub error: ValidationError,
}

pub fn validate(file: &SourceFile, rules: &ValidationRules, labels: &dyn LabelLookup) -> Verdict {
    if let Some(accept) = rules.accept.as_deref() {
        if !accept.is_empty() && !accept.iter().any(|m| m == file.mime()) {
            let reason = labels.label(
                "validation.type_not_allowed",
                &[("name", file.name().to_string())],
            );
            return Verdict::Rejected {
                error: ValidationError::TypeNotAllowed {
                    name: file.name().to_string(),
                    mime: file.mime().to_string(),
                },
                reason,
            };
        }
    }

    if let Some(max_mb) = rules.max_size_mb {
        if file.size() as f64 > max_mb * BYTES_PER_MB {
            let size_mb = file.size_mb();
            let reason = labels.label(
                "validation.size_exceeded",
                &[
                    ("name", file.name().to_string()),
                    ("size", format!("{:.2}", size_mb)),
                    ("maxSize", max_mb.to_string()),
                ],
            );
            return Verdict::Rejected {
                error: ValidationError::SizeExceeded {
                    name: file.name().to_string(),
                    size_mb,
                    max_mb,
                },
                reason,
            };
        }
    }

    Verdict::Accepted
}

/// One verdict per file, in input order.
pub fn validate_all(
    files: &[SourceFile],
    rules: &ValidationRules,
    labels: &dyn LabelLookup,
) -> Vec<Verdict> {
    files.iter().map(|f| validate(f, rules, labels)).collect()
}
