use crate::domain::{DEFAULT_VIEW_BOX, GenerationRequest};

const SYSTEM_PROMPT: &str = "You are an expert SVG designer specializing in clean, geometric, \
well-formed vector illustrations. Output raw SVG markup only: no explanations, no comments, \
no markdown formatting. The response must start with <svg and end with </svg>.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub system: String,
    pub user: String,
}

pub struct PromptBuilder;

impl PromptBuilder {
    pub fn build(request: &GenerationRequest) -> BuiltPrompt {
        let prompt = request.prompt.trim();

        let user = format!(
            "Create a professional SVG illustration using geometric shapes for: \"{prompt}\"

Shape-based design requirements:
- Use <rect>, <circle>, <ellipse>, <polygon> and <line> as the primary building blocks.
- Use <path> only when a shape cannot be expressed otherwise.
- Break complex objects into basic shapes and group related ones with <g>.
- Position and orient with transform=\"translate(x,y)\" and transform=\"rotate(deg)\".
- Keep a cohesive palette of 3-5 colors and consistent stroke widths.

Technical requirements:
- Declare a viewBox (for example \"{DEFAULT_VIEW_BOX}\") so the illustration scales.
- Set width=\"100%\" and height=\"100%\" on the root element.
- The SVG must be fully valid and self-contained.

Return ONLY the SVG code. The output must start with <svg and end with </svg>."
        );

        BuiltPrompt {
            system: SYSTEM_PROMPT.to_string(),
            user,
        }
    }
}
