use std::fmt::Write;

use serde::Serialize;

use crate::classifier::{AccessSet, ClassificationResult, Outcome};
use crate::service::{CodeDetails, SpecializationList};

/// Format styles supported by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

pub fn render_classification(
    result: &ClassificationResult,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(out, "Code: {} ({})", result.code, result.name)?;
            writeln!(out, "Confidence: {:.2}", result.confidence)?;
            writeln!(out, "Outcome: {}", outcome_label(result.outcome))?;
            Ok(out)
        }
        OutputFormat::Json => to_json(result),
    }
}

pub fn render_access(access: &AccessSet, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(out, "Primary code: {}", access.primary_code)?;
            if access.codes.is_empty() {
                writeln!(out, "No codes granted.")?;
            } else {
                let codes = access
                    .codes
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(out, "Access codes: {codes}")?;
            }
            Ok(out)
        }
        OutputFormat::Json => to_json(access),
    }
}

pub fn render_specializations(
    list: &SpecializationList,
    format: OutputFormat,
) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(out, "{} specialization(s)", list.count)?;
            for entry in &list.specializations {
                writeln!(out, "  {code:>5}  {name}", code = entry.code, name = entry.name)?;
            }
            Ok(out)
        }
        OutputFormat::Json => to_json(list),
    }
}

pub fn render_code_details(details: &CodeDetails, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => {
            let mut out = String::new();
            writeln!(out, "Code: {}", details.code)?;
            writeln!(out, "Name: {}", details.name)?;
            writeln!(
                out,
                "Category: {} • Specialty: {}",
                details.category, details.specialty
            )?;
            if let (Some(category), Some(specialty)) = (&details.category_id, &details.specialty_id)
            {
                writeln!(out, "Stored under: category {category} / specialty {specialty}")?;
            }
            Ok(out)
        }
        OutputFormat::Json => to_json(details),
    }
}

pub fn outcome_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Matched => "matched",
        Outcome::Extended => "extended (new code)",
        Outcome::NameMatch => "filename match",
        Outcome::Fallback => "fallback (general access)",
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}
