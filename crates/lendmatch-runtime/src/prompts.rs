//! Prompts for the LLM reasoning service.
//!
//! The system prompt is fixed and shared by every lender call. The user
//! prompt carries the application fields and one lender's criteria.

use std::fmt::Write;

use lendmatch_core::{Application, Lender};

/// System prompt shared by every eligibility call.
///
/// Frames the model as an analyst applying given criteria, not a lender
/// making a credit decision.
pub const SYSTEM_PROMPT: &str = r#"
You are a lending criteria analyst. You compare a loan application against one lender's published criteria.

You do not make credit decisions.
You do not invent criteria.
You evaluate every criterion you are given, and only those.

## Evaluation Rules
- Comparison "min": the application value must be >= the required value
- Comparison "max": the application value must be <= the required value
- Comparison "exact": the application value must equal the required value
- Comparison "excludes": the application value must NOT appear in the listed values
- Array criteria without "excludes" (allowed states, industries): the application value must appear in the list
- Boolean criteria: the application flag must equal the required flag
- If the application does not provide the data for a criterion, mark it not met when it is required and explain what is missing
- Consider both required and optional criteria when scoring confidence

## Confidence Guidelines
- 0.9-1.0: every criterion clearly met
- 0.6-0.9: required criteria met, some optional criteria missed or uncertain
- 0.3-0.6: borderline, a required criterion is uncertain
- < 0.3: one or more required criteria clearly not met

## Response Format (JSON only)
{
  "overall_match": true,
  "confidence_score": 0.85,
  "overall_reasoning": "Brief summary of why the application matches or not",
  "criteria_evaluations": [
    {
      "criteria_key": "min_fico_score",
      "met": true,
      "reasoning": "FICO score of 720 exceeds the minimum of 680 by 40 points"
    }
  ],
  "improvement_suggestions": [
    "Increase down payment to 15% to improve approval odds"
  ]
}

Use the exact criteria_key values you are given. Return ONLY valid JSON: no markdown, no code fences, no additional text.
"#;

/// Build the user prompt for one lender.
pub fn eligibility_prompt(application: &Application, lender: &Lender) -> String {
    let mut prompt = String::new();

    prompt.push_str("LOAN APPLICATION DATA:\n");
    if application.fields.is_empty() {
        prompt.push_str("  (no fields provided)\n");
    }
    for (name, value) in &application.fields {
        let _ = writeln!(prompt, "  - {}: {}", name, value);
    }

    let _ = write!(prompt, "\nLENDER: {}\n\nLENDER CRITERIA:\n", lender.name);
    for criterion in &lender.criteria {
        let _ = writeln!(
            prompt,
            "  - {} ({}): {} [Type: {}, Required: {}, Category: {}, Comparison: {}]",
            criterion.display_name,
            criterion.key,
            criterion.expected_value,
            criterion.value_type,
            criterion.is_required,
            criterion.category,
            criterion.comparison
        );
        if let Some(description) = &criterion.description {
            let _ = writeln!(prompt, "      {}", description);
        }
    }

    let _ = write!(
        prompt,
        "\nEvaluate all {} criteria above and respond in the required JSON format.\n",
        lender.criteria.len()
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use lendmatch_core::{ComparisonMode, CriterionDefinition, ValueType};

    #[test]
    fn test_prompt_lists_fields_and_criteria() {
        let application = Application::new("app-7")
            .with_field("fico_score", 712)
            .with_field("state", "TX");
        let lender = Lender::new("apex", "Apex Commercial Capital")
            .with_criterion(
                CriterionDefinition::new(
                    "min_fico_score",
                    "Minimum FICO Score",
                    680,
                    ValueType::Number,
                )
                .in_category("credit"),
            )
            .with_criterion(
                CriterionDefinition::new(
                    "excluded_states",
                    "Excluded States",
                    vec!["CA", "NV"],
                    ValueType::Array,
                )
                .with_mode(ComparisonMode::Excludes)
                .with_field("state")
                .optional(),
            );

        let prompt = eligibility_prompt(&application, &lender);

        assert!(prompt.contains("  - fico_score: 712"));
        assert!(prompt.contains("LENDER: Apex Commercial Capital"));
        assert!(prompt.contains(
            "Minimum FICO Score (min_fico_score): 680 [Type: number, Required: true, Category: credit, Comparison: min]"
        ));
        assert!(prompt
            .contains("Excluded States (excluded_states): [CA, NV] [Type: array, Required: false"));
        assert!(prompt.contains("Evaluate all 2 criteria"));
    }

    #[test]
    fn test_system_prompt_names_response_keys() {
        for key in [
            "overall_match",
            "confidence_score",
            "criteria_evaluations",
            "improvement_suggestions",
        ] {
            assert!(SYSTEM_PROMPT.contains(key));
        }
        assert!(SYSTEM_PROMPT.contains("excludes"));
    }
}
