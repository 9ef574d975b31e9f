use serde::{Deserialize, Serialize};

// Wound bed tissue composition, percentages
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TissuePercentage {
    pub necrotic: f64,
    pub slough: f64,
    pub granulation: f64,
    pub epithelialization: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Lesion {
    pub id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub lesion_type: String,
    pub location: String,
    pub start_date: String,
    #[serde(default)]
    pub previous_treatments: Vec<String>,
}

// One assessment of a lesion
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub id: String,
    pub date: String,
    pub width_mm: f64,
    pub height_mm: f64,
    pub depth_mm: f64,
    #[serde(default)]
    pub tunneling_mm: Option<f64>,
    pub exudate: String,
    #[serde(default)]
    pub exudate_type: Option<String>,
    pub tissue_types: TissuePercentage,
    #[serde(default)]
    pub infection_signs: Vec<String>,
    #[serde(default)]
    pub wound_edges: Vec<String>,
    #[serde(default)]
    pub periwound_skin: Vec<String>,
    pub pain_level: u8,
    #[serde(default)]
    pub notes: String,
    // data URL
    #[serde(default)]
    pub image_url: Option<String>,
}

// POST /api/treatment-suggestion
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentRequest {
    pub lesion: Lesion,
    pub current_assessment: Assessment,
    #[serde(default)]
    pub patient_info: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentSuggestion {
    pub cleaning: String,
    pub primary_dressing: String,
    pub secondary_dressing: String,
    pub frequency: String,
    pub rationale: String,
}

// POST /api/image-analysis
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysisRequest {
    pub base64_image_url: String,
}

// Assessment fields pre-filled from a wound photo
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ImageAnalysis {
    pub tissue_types: TissuePercentage,
    pub exudate: String,
    pub infection_signs: Vec<String>,
    pub wound_edges: Vec<String>,
    pub periwound_skin: Vec<String>,
    pub notes: String,
}

// Image payload as sent to the model
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    // data:<mime>;base64,<payload>
    pub fn from_data_url(url: &str) -> Option<Self> {
        let (header, data) = url.split_once(',')?;
        let mime_type = header.split(';').next()?.split_once(':')?.1;

        if mime_type.is_empty() || data.is_empty() {
            return None;
        }

        Some(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }
}
