//! The canned analysis returned for every stored image. The service performs
//! no OCR or model inference of its own.

use chrono::Utc;
use medscan_client::{AnalysisResult, Interaction, Medicine, RiskLevel};

pub fn sample_analysis() -> AnalysisResult {
    AnalysisResult {
        extracted_text: Some(sample_text()),
        medicines: vec![
            medicine(
                "Amoxicillin",
                "500mg",
                "Every 8 hours",
                "7 days",
                "Antibiotic",
                "Take with food to reduce stomach upset. Complete full course.",
            ),
            medicine(
                "Ibuprofen",
                "400mg",
                "Every 6 hours",
                "As needed",
                "Pain Relief",
                "Take with food. Do not exceed 6 tablets in 24 hours.",
            ),
            medicine(
                "Omeprazole",
                "20mg",
                "Once daily",
                "Ongoing",
                "Acid Reducer",
                "Take before breakfast on empty stomach.",
            ),
        ],
        interactions: vec![Interaction {
            drugs: vec!["Ibuprofen".to_string(), "Omeprazole".to_string()],
            severity: RiskLevel::Low,
            description:
                "Minor interaction: Omeprazole may slightly reduce the effectiveness of Ibuprofen."
                    .to_string(),
            recommendation: Some(
                "Monitor for reduced pain relief. Consider alternative pain management if needed."
                    .to_string(),
            ),
        }],
        recommendations: [
            "Complete the full course of Amoxicillin even if symptoms improve",
            "Take Ibuprofen with food to prevent stomach irritation",
            "Omeprazole should be taken 30-60 minutes before breakfast",
            "Contact your doctor if you experience severe side effects",
            "Stay hydrated and get adequate rest during antibiotic treatment",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        overall_risk: RiskLevel::Low,
        summary: Some(
            "This prescription appears to be a standard treatment combination with minimal risks. \
             The detected interaction is minor and manageable with proper monitoring."
                .to_string(),
        ),
    }
}

fn medicine(
    name: &str,
    dosage: &str,
    frequency: &str,
    duration: &str,
    kind: &str,
    instructions: &str,
) -> Medicine {
    Medicine {
        dosage: Some(dosage.to_string()),
        frequency: Some(frequency.to_string()),
        duration: Some(duration.to_string()),
        kind: Some(kind.to_string()),
        instructions: Some(instructions.to_string()),
        ..Medicine::named(name)
    }
}

fn sample_text() -> String {
    format!(
        "Dr. John Smith, MD\n\
         Date: {}\n\
         \n\
         Patient: Jane Doe\n\
         DOB: 01/15/1980\n\
         \n\
         Rx:\n\
         1. Amoxicillin 500mg - Take 1 capsule every 8 hours for 7 days\n\
         2. Ibuprofen 400mg - Take 1 tablet every 6 hours as needed for pain\n\
         3. Omeprazole 20mg - Take 1 capsule daily before breakfast\n\
         \n\
         Instructions: Complete full course of antibiotics. Take with food to reduce stomach upset.\n\
         \n\
         Dr. John Smith, MD\n\
         License #: MD123456",
        Utc::now().format("%m/%d/%Y")
    )
}
