//! Minimum-quality gates applied to intermediate artifacts.

use crate::pipeline::types::{PipelineConfig, PipelineError, PipelineStep, PracticalBundle};

const CODE_MARKERS: [char; 3] = ['=', '(', '['];

pub fn validate_theory(theory: &str, config: &PipelineConfig) -> Result<(), PipelineError> {
    let trimmed = theory.trim();
    let chars = trimmed.chars().count();
    if chars < config.min_theory_chars {
        return Err(PipelineError::Validation {
            step: PipelineStep::Theory,
            reason: format!(
                "theory is {} characters, expected at least {}",
                chars, config.min_theory_chars
            ),
        });
    }

    let words = trimmed.split_whitespace().count();
    if words < config.min_theory_words {
        return Err(PipelineError::Validation {
            step: PipelineStep::Theory,
            reason: format!(
                "theory is {} words, expected at least {}",
                words, config.min_theory_words
            ),
        });
    }

    Ok(())
}

pub fn validate_code(code: &str, config: &PipelineConfig) -> Result<(), PipelineError> {
    let trimmed = code.trim();
    let chars = trimmed.chars().count();
    if chars < config.min_code_chars {
        return Err(PipelineError::Validation {
            step: PipelineStep::BruteForceCode,
            reason: format!(
                "code is {} characters, expected at least {}",
                chars, config.min_code_chars
            ),
        });
    }

    if !trimmed.contains(CODE_MARKERS) {
        return Err(PipelineError::Validation {
            step: PipelineStep::BruteForceCode,
            reason: "code contains no assignment, call or indexing".to_string(),
        });
    }

    Ok(())
}

/// Whether a bundle may be cached or written to the record store
pub fn is_persistable(bundle: &PracticalBundle, config: &PipelineConfig) -> bool {
    if !bundle.is_success() {
        return false;
    }

    let (Some(theory), Some(code), Some(explanation), Some(report)) = (
        bundle.theory.as_deref(),
        bundle.brute_force_code.as_deref(),
        bundle.brute_force_explanation.as_deref(),
        bundle.latex_report.as_deref(),
    ) else {
        return false;
    };

    validate_theory(theory, config).is_ok()
        && validate_code(code, config).is_ok()
        && !explanation.trim().is_empty()
        && !report.trim().is_empty()
}
