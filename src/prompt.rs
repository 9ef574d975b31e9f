use serde_json::{Value, json};

use crate::models::TreatmentRequest;

pub const TREATMENT_TEMPERATURE: f64 = 0.3;
pub const IMAGE_ANALYSIS_TEMPERATURE: f64 = 0.1;

fn list_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}

// Prompt for a dressing / cleaning recommendation
pub fn treatment_prompt(req: &TreatmentRequest) -> String {
    let lesion = &req.lesion;
    let a = &req.current_assessment;
    let t = &a.tissue_types;

    let previous = list_or(&lesion.previous_treatments, "None recorded");

    format!(
        "Act as a senior wound care specialist nurse.
Analyse the IMAGE (if provided) and the CLINICAL DATA below and suggest the best treatment (dressings).

=== PATIENT AND CONTEXT ===
{patient}

=== CURRENT LESION ===
- Type: {kind}
- Location: {location}
- Dimensions: {w}mm x {h}mm x {d}mm
- Tunneling/undermining: {tunneling}mm
- Previous treatments: {previous}

=== WOUND BED (TIME) ===
- Tissue: necrotic {necrotic}%, slough {slough}%, granulation {granulation}%, epithelialization {epi}%
- Infection/inflammation: {infection}
- Moisture (exudate): level {exudate}, type {exudate_type}
- Edges: {edges}

=== PERIWOUND SKIN ===
- Characteristics: {periwound}

PAIN (0-10): {pain}
NURSING NOTES: {notes}

=== INSTRUCTIONS ===
1. ALLERGIES: check the patient section carefully. If allergies are listed (e.g. silver, iodine, latex, sulfa), do NOT suggest products containing them.
2. HISTORY: take previous treatments into account. If one failed, suggest an alternative or justify keeping it with changes in frequency or application.
3. VISUAL ANALYSIS: if an image is attached, use it to confirm biofilm, maceration or necrosis not reported in the numbers.
4. PROTOCOL: give the cleaning method, primary dressing, secondary dressing and change frequency.

Answer strictly in the requested JSON format.",
        patient = req.patient_info.as_deref().unwrap_or("Not provided"),
        kind = lesion.lesion_type,
        location = lesion.location,
        w = a.width_mm,
        h = a.height_mm,
        d = a.depth_mm,
        tunneling = a.tunneling_mm.unwrap_or(0.0),
        previous = previous,
        necrotic = t.necrotic,
        slough = t.slough,
        granulation = t.granulation,
        epi = t.epithelialization,
        infection = list_or(&a.infection_signs, "No evident signs"),
        exudate = a.exudate,
        exudate_type = a.exudate_type.as_deref().unwrap_or("Not specified"),
        edges = list_or(&a.wound_edges, "Intact"),
        periwound = list_or(&a.periwound_skin, "Intact"),
        pain = a.pain_level,
        notes = a.notes,
    )
}

pub const IMAGE_ANALYSIS_PROMPT: &str = "Analyse this clinical wound image.
Identify the visually observable characteristics needed to fill in an assessment form.

Estimate the tissue type percentages (TIME - Tissue); they must add up to 100%.
Estimate the exudate level (moisture).
Identify visual signs of infection (redness/erythema, edema, etc).
Identify edge and periwound skin characteristics (maceration, hyperkeratosis, etc).

Answer ONLY with the JSON.";

pub fn treatment_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "cleaning": { "type": "STRING", "description": "Recommended cleaning method and solution (e.g. saline, PHMB)." },
            "primaryDressing": { "type": "STRING", "description": "Main dressing in contact with the wound bed." },
            "secondaryDressing": { "type": "STRING", "description": "Secondary dressing securing the primary or managing exudate." },
            "frequency": { "type": "STRING", "description": "How often the dressing should be changed." },
            "rationale": { "type": "STRING", "description": "Brief clinical rationale based on tissue type, exudate and visual analysis." }
        },
        "required": ["cleaning", "primaryDressing", "secondaryDressing", "frequency", "rationale"]
    })
}

pub fn image_analysis_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "tissueTypes": {
                "type": "OBJECT",
                "properties": {
                    "necrotic": { "type": "NUMBER", "description": "Percentage of necrotic tissue (black/brown)." },
                    "slough": { "type": "NUMBER", "description": "Percentage of slough (yellow/fibrous)." },
                    "granulation": { "type": "NUMBER", "description": "Percentage of granulation (red/pink)." },
                    "epithelialization": { "type": "NUMBER", "description": "Percentage of epithelial tissue (pink edges)." }
                },
                "required": ["necrotic", "slough", "granulation", "epithelialization"]
            },
            "exudate": {
                "type": "STRING",
                "description": "Exudate level.",
                "enum": ["None/Dry", "Low", "Medium", "High"]
            },
            "infectionSigns": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Visual signs of infection, e.g. erythema, edema, pus." },
            "woundEdges": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Edge characteristics, e.g. maceration, epibole, undermining." },
            "periwoundSkin": { "type": "ARRAY", "items": { "type": "STRING" }, "description": "Periwound skin, e.g. maceration, excoriation, xerosis, hyperkeratosis." },
            "notes": { "type": "STRING", "description": "Short clinical observation based on the image." }
        },
        "required": ["tissueTypes", "exudate", "infectionSigns", "woundEdges", "periwoundSkin", "notes"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Assessment, Lesion, TissuePercentage};

    fn request() -> TreatmentRequest {
        TreatmentRequest {
            lesion: Lesion {
                id: "l1".into(),
                patient_id: "p1".into(),
                lesion_type: "Pressure ulcer".into(),
                location: "Sacrum".into(),
                start_date: "2024-01-01".into(),
                previous_treatments: vec!["Hydrocolloid".into()],
            },
            current_assessment: Assessment {
                id: "a1".into(),
                date: "2024-02-01".into(),
                width_mm: 40.0,
                height_mm: 25.0,
                depth_mm: 3.0,
                tunneling_mm: None,
                exudate: "High".into(),
                exudate_type: None,
                tissue_types: TissuePercentage {
                    necrotic: 10.0,
                    slough: 30.0,
                    granulation: 60.0,
                    epithelialization: 0.0,
                },
                infection_signs: vec![],
                wound_edges: vec!["Maceration".into()],
                periwound_skin: vec![],
                pain_level: 6,
                notes: "Odour at dressing change".into(),
                image_url: None,
            },
            patient_info: Some("Allergies: silver".into()),
        }
    }

    #[test]
    fn treatment_prompt_carries_clinical_data() {
        let prompt = treatment_prompt(&request());
        assert!(prompt.contains("Allergies: silver"));
        assert!(prompt.contains("Pressure ulcer"));
        assert!(prompt.contains("40mm x 25mm x 3mm"));
        assert!(prompt.contains("Tunneling/undermining: 0mm"));
        assert!(prompt.contains("Previous treatments: Hydrocolloid"));
        assert!(prompt.contains("Infection/inflammation: No evident signs"));
        assert!(prompt.contains("Edges: Maceration"));
        assert!(prompt.contains("PAIN (0-10): 6"));
    }

    #[test]
    fn schemas_require_every_field() {
        assert_eq!(treatment_schema()["required"].as_array().unwrap().len(), 5);
        assert_eq!(image_analysis_schema()["required"].as_array().unwrap().len(), 6);
    }
}
