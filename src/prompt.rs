//! Prompt augmentation shared by every generation path.

use crate::constants::DEFAULT_LANGUAGE;
use crate::model::AspectRatio;

/// Country codes accepted by `/api/translate`, mapped to the language name
/// used in prompts.
const LANGUAGE_CODES: [(&str, &str); 21] = [
    ("BR", "Brazilian Portuguese"),
    ("CN", "Chinese (Simplified)"),
    ("CZ", "Czech"),
    ("DE", "German"),
    ("EN", "English"),
    ("ES", "Spanish"),
    ("FR", "French"),
    ("HK", "Chinese (Traditional)"),
    ("ID", "Indonesian"),
    ("IN", "Hindi"),
    ("IT", "Italian"),
    ("JP", "Japanese"),
    ("KR", "Korean"),
    ("MY", "Malay"),
    ("NL", "Dutch"),
    ("PH", "Filipino"),
    ("PL", "Polish"),
    ("SA", "Arabic"),
    ("TH", "Thai"),
    ("TR", "Turkish"),
    ("VN", "Vietnamese"),
];

/// Expands a country code like `JP` to a language name. Anything else is
/// passed through as given.
pub fn language_name(code_or_name: &str) -> &str {
    let trimmed = code_or_name.trim();
    LANGUAGE_CODES
        .iter()
        .find(|(code, _)| code.eq_ignore_ascii_case(trimmed))
        .map(|(_, name)| *name)
        .unwrap_or(trimmed)
}

/// Instruction describing a ratio the provider can't take as a field.
pub fn aspect_instruction(ratio: AspectRatio) -> String {
    format!(
        "The image must use a {} aspect ratio ({} composition).",
        ratio.token(),
        ratio.orientation()
    )
}

/// Instruction pinning rendered text to `language`.
pub fn language_instruction(language: &str) -> String {
    format!(
        "IMPORTANT: Generate all text content in {language}. Every headline, subheadline and call-to-action must be written in {language}."
    )
}

/// Appends the aspect-ratio instruction, when given, and then the language
/// instruction when the language isn't the default.
pub fn augment_prompt(prompt: &str, aspect: Option<AspectRatio>, language: &str) -> String {
    let mut augmented = prompt.trim().to_string();
    if let Some(ratio) = aspect {
        augmented.push_str("\n\n");
        augmented.push_str(&aspect_instruction(ratio));
    }
    let language = language.trim();
    if !language.is_empty() && !language.eq_ignore_ascii_case(DEFAULT_LANGUAGE) {
        augmented.push_str("\n\n");
        augmented.push_str(&language_instruction(language));
    }
    augmented
}

/// Prompt for adapting an uploaded image to another language.
pub fn translation_prompt(language: &str) -> String {
    format!(
        "Adapt this image for {language} audience in a square (1:1) format.

Key requirements:
- Create a square (1:1) composition that will work well for Google Ads
- Translate text naturally and creatively to {language}, culturally native to the target audience
- Keep the composition balanced and centered so it can be expanded to other formats
- Maintain the visual design, layout, style and quality
- Generate a new image with the translated text

Return a high-quality image that looks native to {language} speakers. The translation should feel natural, not literal."
    )
}

/// Prompt for re-composing an uploaded image as 3:2 landscape.
pub const RESIZE_PROMPT: &str =
    "Resize this image to 3:2 landscape format. Keep all elements visible and readable.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_prompts_are_left_alone() {
        assert_eq!(
            augment_prompt(" a red shoe ", None, "English"),
            "a red shoe"
        );
        assert_eq!(augment_prompt("a red shoe", None, "english"), "a red shoe");
    }

    #[test]
    fn language_instruction_comes_last() {
        let prompt = augment_prompt("a red shoe", Some(AspectRatio::Widescreen), "Japanese");
        let aspect_at = prompt.find("16:9").expect("aspect instruction present");
        let language_at = prompt
            .find("in Japanese")
            .expect("language instruction present");
        assert!(prompt.starts_with("a red shoe"));
        assert!(aspect_at < language_at);
        assert!(prompt.ends_with("must be written in Japanese."));
    }

    #[test]
    fn country_codes_expand() {
        assert_eq!(language_name("jp"), "Japanese");
        assert_eq!(language_name("BR"), "Brazilian Portuguese");
        assert_eq!(language_name("Klingon"), "Klingon");
    }
}
