use std::fmt::Write;

use super::{FileBody, FileRequest, OracleRequest};
use crate::llm::OraclePrompt;
use crate::taxonomy::{Code, OutlineEntry, SpecializationEntry};

const CLASSIFIER_SYSTEM: &str = "You are a medical classification expert. Reply with a single valid JSON object and nothing else: no prose, no markdown.";
const IMAGING_SYSTEM: &str = "You are a medical imaging classification expert. Inspect the image and assign it to the correct medical specialization. Reply with a single valid JSON object and nothing else.";
const ACCESS_SYSTEM: &str = "You are a medical access control expert. Reply with a single valid JSON object and nothing else.";

const DIRECT_MAX_TOKENS: u32 = 500;
const PLACEMENT_MAX_TOKENS: u32 = 300;
const FILE_MAX_TOKENS: u32 = 500;
const ACCESS_MAX_TOKENS: u32 = 500;

/// Build the model prompt for `request`.
pub fn build(request: &OracleRequest) -> OraclePrompt {
    match request {
        OracleRequest::Direct {
            specialization,
            catalogue,
        } => direct(specialization, catalogue),
        OracleRequest::Placement {
            specialization,
            outline,
        } => placement(specialization, outline),
        OracleRequest::File(file) => file_prompt(file),
        OracleRequest::Access {
            code,
            name,
            catalogue,
        } => access(*code, name, catalogue),
    }
}

/// One `code: name` line per entry.
pub fn render_catalogue(catalogue: &[SpecializationEntry]) -> String {
    catalogue
        .iter()
        .map(|entry| format!("{}: {}", entry.code, entry.name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_outline(outline: &[OutlineEntry]) -> String {
    if outline.is_empty() {
        return "(the hierarchy is empty)".to_string();
    }
    outline
        .iter()
        .map(|row| {
            format!(
                "Category {} ({}) -> Specialty {} ({}) -> Base Code: {}",
                row.category_id,
                row.category_name,
                row.specialty_id,
                row.specialty_name,
                row.base_code
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn direct(specialization: &str, catalogue: &[SpecializationEntry]) -> OraclePrompt {
    let text = format!(
        r#"Find the best matching code for a doctor's specialization.

Available codes:
{catalogue}

Specialization: "{specialization}"

Rules:
1. Return a code that exists in the list above. Never invent codes.
2. Vague or general input maps to the general code of its group (codes ending in 00, e.g. 1200, 2100).
3. Specific input maps to the specific code.
4. Surgical wording (surgery, surgical, operation, transplant) points at surgical groups (2xxx); physician/medicine wording points at medical groups.

Reply with exactly this JSON shape:
{{"code": 1234, "reasoning": "brief explanation", "confidence": 0.95}}"#,
        catalogue = render_catalogue(catalogue),
    );
    OraclePrompt {
        system: CLASSIFIER_SYSTEM.to_string(),
        text,
        image: None,
        max_tokens: DIRECT_MAX_TOKENS,
    }
}

fn placement(specialization: &str, outline: &[OutlineEntry]) -> OraclePrompt {
    let text = format!(
        r#"A specialization is missing from the hierarchy. Decide where it belongs.

New specialization: "{specialization}"

Existing hierarchy:
{outline}

Determine:
1. The category it belongs to. You may propose a new category id; if you do, give its name.
2. The specialty inside that category. You may propose a new specialty id; if you do, give its name.
3. The base code of that specialty (its hundred-block, e.g. 1200).

Reply with exactly this JSON shape (names may be null for existing groups):
{{"category_id": "1", "category_name": null, "specialty_id": "12", "specialty_name": null, "base_code": 1200, "reasoning": "brief explanation"}}"#,
        outline = render_outline(outline),
    );
    OraclePrompt {
        system: CLASSIFIER_SYSTEM.to_string(),
        text,
        image: None,
        max_tokens: PLACEMENT_MAX_TOKENS,
    }
}

fn file_prompt(file: &FileRequest) -> OraclePrompt {
    let catalogue = render_catalogue(&file.catalogue);
    let reply_shape = r#"{"code": 1234, "reasoning": "brief explanation", "confidence": 0.95}"#;
    match &file.body {
        FileBody::Image(image) => {
            let text = format!(
                r#"Classify this medical image.

Available specialization codes:
{catalogue}

Filename: {filename}
Description: {description}

Rules:
1. Return a code that exists in the list above. Never invent codes.
2. Use the image content, the filename and the description.
3. Prefer the most specific applicable code.
4. Look for visual cues that distinguish surgical, diagnostic and clinical material.

Reply with exactly this JSON shape:
{reply_shape}"#,
                filename = file.filename,
                description = file.description,
            );
            OraclePrompt {
                system: IMAGING_SYSTEM.to_string(),
                text,
                image: Some(image.clone()),
                max_tokens: FILE_MAX_TOKENS,
            }
        }
        FileBody::Text { preview } => {
            let mut text = format!(
                "Classify this medical file.\n\nAvailable codes:\n{catalogue}\n\nMedical file:\n- Filename: {}\n- File type: {}\n- Description: {}\n",
                file.filename,
                file.content_type.as_deref().unwrap_or("unknown"),
                file.description,
            );
            match preview {
                Some(preview) => {
                    let _ = writeln!(text, "- Content preview: {preview}");
                }
                None => text.push_str("- No content preview available\n"),
            }
            let _ = write!(
                text,
                r#"
Rules:
1. Return a code that exists in the list above. Never invent codes.
2. Prefer the most specific applicable code, using filename, type, description and content.
3. Keyword hints: surgery/operation/post-op/pre-op -> surgical groups (2xxx); lab/blood/test/results -> lab medicine (63xx); imaging/x-ray/scan/MRI/CT -> radiology (61xx); pathology/biopsy/histology -> pathology (62xx).

Reply with exactly this JSON shape:
{reply_shape}"#
            );
            OraclePrompt {
                system: CLASSIFIER_SYSTEM.to_string(),
                text,
                image: None,
                max_tokens: FILE_MAX_TOKENS,
            }
        }
    }
}

fn access(code: Code, name: &str, catalogue: &[SpecializationEntry]) -> OraclePrompt {
    let text = format!(
        r#"Decide which diagnostic and support codes a doctor needs besides their own.

Doctor's specialization: {name} (code {code})

Available codes:
{catalogue}

Decision rule: does this specialty routinely order or interpret diagnostic tests as part of its primary clinical workflow?
- If no (for example psychiatry, counselling, palliative care): return only [{code}].
- If yes: add the relevant diagnostic codes from the 6xxx group (6100 radiology, 6200 pathology, 6300 lab medicine).

Rules:
1. Always include the primary code {code}.
2. Only add 6xxx codes the doctor orders or reviews regularly.
3. Never add other clinical specialty codes.
4. Only return codes that exist in the list above.

Reply with exactly this JSON shape:
{{"codes": [{code}], "reasoning": "brief explanation"}}"#,
        catalogue = render_catalogue(catalogue),
    );
    OraclePrompt {
        system: ACCESS_SYSTEM.to_string(),
        text,
        image: None,
        max_tokens: ACCESS_MAX_TOKENS,
    }
}
