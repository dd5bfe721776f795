use std::fmt;

use crate::models::{AnalysisResult, Interaction, Medicine, RiskLevel};

pub const DEFAULT_SUMMARY: &str = "Analysis completed successfully.";
pub const DEFAULT_MEDICINE_TYPE: &str = "Medication";
pub const DEFAULT_INTERACTION_TITLE: &str = "Drug Interaction";
pub const DISCLAIMER: &str = "Medical Disclaimer: This analysis is for informational purposes only. \
Always consult with healthcare professionals before making any medical decisions. \
This tool should not replace professional medical advice, diagnosis, or treatment.";

/// Presentation of one [`AnalysisResult`], with every fallback already applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub risk: RiskLevel,
    pub risk_badge: String,
    pub summary: String,
    pub medicines: Vec<MedicineCard>,
    pub interactions: Vec<InteractionCard>,
    pub recommendations: Vec<String>,
    pub extracted_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicineCard {
    pub name: String,
    pub kind: String,
    /// Only the details that are present, in display order.
    pub details: Vec<(&'static str, String)>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionCard {
    pub title: String,
    pub severity: String,
    pub description: String,
    pub recommendation: Option<String>,
}

pub struct ResultRenderer;

impl ResultRenderer {
    /// Pure: reads the result, never changes it.
    pub fn render(result: &AnalysisResult) -> RenderedReport {
        RenderedReport {
            risk: result.overall_risk,
            risk_badge: result.overall_risk.badge(),
            summary: present(&result.summary)
                .unwrap_or(DEFAULT_SUMMARY)
                .to_string(),
            medicines: result.medicines.iter().map(medicine_card).collect(),
            interactions: result.interactions.iter().map(interaction_card).collect(),
            recommendations: result
                .recommendations
                .iter()
                .filter(|r| !r.trim().is_empty())
                .cloned()
                .collect(),
            extracted_text: present(&result.extracted_text).map(str::to_string),
        }
    }
}

/// Blank strings count as absent.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

fn medicine_card(medicine: &Medicine) -> MedicineCard {
    let details = [
        ("Dosage", &medicine.dosage),
        ("Frequency", &medicine.frequency),
        ("Duration", &medicine.duration),
    ]
    .into_iter()
    .filter_map(|(label, value)| present(value).map(|v| (label, v.to_string())))
    .collect();

    MedicineCard {
        name: medicine.name.clone(),
        kind: present(&medicine.kind)
            .unwrap_or(DEFAULT_MEDICINE_TYPE)
            .to_string(),
        details,
        instructions: present(&medicine.instructions).map(str::to_string),
    }
}

fn interaction_card(interaction: &Interaction) -> InteractionCard {
    let drugs: Vec<&str> = interaction
        .drugs
        .iter()
        .map(String::as_str)
        .filter(|d| !d.trim().is_empty())
        .collect();

    InteractionCard {
        title: if drugs.is_empty() {
            DEFAULT_INTERACTION_TITLE.to_string()
        } else {
            drugs.join(" + ")
        },
        severity: interaction.severity.label().to_string(),
        description: interaction.description.clone(),
        recommendation: present(&interaction.recommendation).map(str::to_string),
    }
}

impl fmt::Display for RenderedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overall Risk Assessment")?;
        writeln!(f, "  [{}]", self.risk_badge)?;
        writeln!(f, "  {}", self.summary)?;

        writeln!(f)?;
        writeln!(f, "Extracted Medicines ({})", self.medicines.len())?;
        for card in &self.medicines {
            writeln!(f, "  - {} [{}]", card.name, card.kind)?;
            for (label, value) in &card.details {
                writeln!(f, "      {}: {}", label, value)?;
            }
            if let Some(instructions) = &card.instructions {
                writeln!(f, "      Instructions: {}", instructions)?;
            }
        }

        if !self.interactions.is_empty() {
            writeln!(f)?;
            writeln!(f, "Potential Drug Interactions")?;
            for card in &self.interactions {
                writeln!(f, "  ! {} [{}]", card.title, card.severity)?;
                if !card.description.is_empty() {
                    writeln!(f, "      {}", card.description)?;
                }
                if let Some(recommendation) = &card.recommendation {
                    writeln!(f, "      Recommendation: {}", recommendation)?;
                }
            }
        }

        if !self.recommendations.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recommendations")?;
            for recommendation in &self.recommendations {
                writeln!(f, "  * {}", recommendation)?;
            }
        }

        if let Some(text) = &self.extracted_text {
            writeln!(f)?;
            writeln!(f, "Extracted Text (OCR)")?;
            for line in text.lines() {
                writeln!(f, "  | {}", line)?;
            }
        }

        writeln!(f)?;
        write!(f, "{}", DISCLAIMER)
    }
}
