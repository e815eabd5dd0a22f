//! Prompt Builder: OCR text + analysis mode → the instruction sent to the LLM.
//!
//! Pure string assembly. The OCR text is never inspected, so empty or garbled
//! text still yields a well-formed prompt.

use labelscan_core::{AnalysisMode, AnalysisRequest};

pub const DETAILED_INSTRUCTION: &str = "Analyze the given product data to assess its nutritional value. \
Specifically: Break down the data into macronutrients (e.g., protein, fats, carbohydrates), \
micronutrients (e.g., vitamins, minerals), and other additives (e.g., preservatives, flavor enhancers). \
Evaluate whether the product contains excess sugar by comparing its sugar content to standard dietary \
guidelines (e.g., WHO recommendations). Identify any harmful or potentially harmful ingredients \
(e.g., trans fats, high levels of sodium, artificial additives linked to health risks). \
Provide a summary of its overall health impact with a clear verdict: safe to consume freely, \
consume in moderation, or avoid. Suggest healthier alternatives if applicable. \
Input format: Product name: Ingredients: Nutritional facts (per serving): Additional notes or claims \
(e.g., \"organic,\" \"sugar-free\"). Output should include a detailed assessment and practical recommendations.";

pub const QUICK_INSTRUCTION: &str = "Give a quick nutritional summary of the given product data as a short \
markdown table listing the key nutrients: sodium, carbohydrates, and calories (per serving where stated). \
Below the table, list only the warnings a consumer needs to know (e.g., high sugar, high sodium, \
allergens). Do not include a full nutrient breakdown or long explanations.";

/// Instruction appended for the given mode.
pub fn instruction(mode: AnalysisMode) -> &'static str {
    match mode {
        AnalysisMode::Detailed => DETAILED_INSTRUCTION,
        AnalysisMode::Quick => QUICK_INSTRUCTION,
    }
}

/// Build the exact prompt string: OCR text followed by the mode's instruction.
pub fn build_prompt(text: &str, mode: AnalysisMode) -> String {
    let instruction = instruction(mode);
    let mut prompt = String::with_capacity(text.len() + instruction.len() + 1);
    prompt.push_str(text);
    prompt.push(' ');
    prompt.push_str(instruction);
    prompt
}

pub fn build_request(text: &str, mode: AnalysisMode) -> AnalysisRequest {
    AnalysisRequest {
        prompt: build_prompt(text, mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Sugar: 40g, Sodium: 900mg";

    #[test]
    fn quick_prompt_contains_text_and_instruction() {
        let prompt = build_prompt(LABEL, AnalysisMode::Quick);
        assert!(prompt.contains(LABEL));
        assert!(prompt.contains(QUICK_INSTRUCTION));
        assert!(!prompt.contains(DETAILED_INSTRUCTION));
    }

    #[test]
    fn detailed_prompt_asks_for_verdict_and_alternatives() {
        let prompt = build_prompt(LABEL, AnalysisMode::Detailed);
        assert!(prompt.starts_with(LABEL));
        assert!(prompt.contains("macronutrients"));
        assert!(prompt.contains("micronutrients"));
        assert!(prompt.contains("moderation"));
        assert!(prompt.contains("avoid"));
        assert!(prompt.contains("healthier alternatives"));
    }

    #[test]
    fn mode_changes_output() {
        for text in ["", LABEL, "   \n"] {
            assert_ne!(
                build_prompt(text, AnalysisMode::Detailed),
                build_prompt(text, AnalysisMode::Quick)
            );
        }
    }

    #[test]
    fn building_is_deterministic() {
        assert_eq!(
            build_prompt(LABEL, AnalysisMode::Detailed),
            build_prompt(LABEL, AnalysisMode::Detailed)
        );
        assert_eq!(build_request(LABEL, AnalysisMode::Quick), build_request(LABEL, AnalysisMode::Quick));
    }

    #[test]
    fn blank_text_still_builds_a_prompt() {
        let prompt = build_prompt("  ", AnalysisMode::Quick);
        assert_eq!(prompt, format!("   {QUICK_INSTRUCTION}"));
    }
}
