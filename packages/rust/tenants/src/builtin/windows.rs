//! Window Visualizer: replacement windows.

use std::collections::BTreeMap;
use std::sync::Arc;

use homeviz_shared::{ProductOptions, Scope, StepConfig, StepType};

use crate::config::{TenantConfig, select};
use crate::prompts::{PromptProvider, QUALITY_JSON_CONTRACT, display_value, option_or};
use crate::Tenant;

pub fn tenant() -> Tenant {
    let config = TenantConfig {
        tenant_id: "windows".into(),
        display_name: "Window Visualizer".into(),
        product_schema: vec![
            select(
                "window_type",
                "Window Type",
                true,
                &[
                    ("double_hung", "Double Hung"),
                    ("casement", "Casement"),
                    ("sliding", "Sliding"),
                    ("picture", "Picture Window"),
                    ("bay", "Bay Window"),
                    ("awning", "Awning"),
                ],
            ),
            select(
                "frame_color",
                "Frame Color",
                true,
                &[
                    ("white", "White"),
                    ("black", "Black"),
                    ("bronze", "Bronze"),
                    ("almond", "Almond"),
                    ("wood_grain", "Wood Grain"),
                ],
            ),
            select(
                "glass_type",
                "Glass Type",
                true,
                &[
                    ("clear", "Clear"),
                    ("low_e", "Low-E"),
                    ("tinted", "Tinted"),
                    ("frosted", "Frosted"),
                ],
            ),
            select(
                "grid_pattern",
                "Grid Pattern",
                false,
                &[
                    ("none", "None"),
                    ("colonial", "Colonial"),
                    ("prairie", "Prairie"),
                    ("diamond", "Diamond"),
                ],
            ),
        ],
        pipeline_steps: vec![
            "cleanup".into(),
            "window_insertion".into(),
            "quality_check".into(),
        ],
        step_configs: BTreeMap::from([
            (
                "cleanup".to_string(),
                StepConfig::new(StepType::Cleanup, "Preparing image", 20),
            ),
            (
                "window_insertion".to_string(),
                StepConfig::new(StepType::Insertion, "Visualizing Windows", 70)
                    .with_feature("windows", "windows"),
            ),
            (
                "quality_check".to_string(),
                StepConfig::new(StepType::QualityCheck, "Final Review", 90),
            ),
        ]),
    };

    Tenant::new(config, Arc::new(WindowPrompts))
}

struct WindowPrompts;

impl PromptProvider for WindowPrompts {
    fn cleanup_prompt(&self) -> String {
        "Analyze this image for window visualization preparation.

Clean the image by:
- Removing any temporary items near windows (ladders, tools, covers)
- Ensuring clear visibility of all window openings
- Maintaining the natural lighting and house architecture

PRESERVE EXACTLY:
- All permanent structures
- Existing window frames and openings
- House siding, trim, and architectural details
- Landscaping and surroundings

Output the cleaned image maintaining original perspective and lighting."
            .to_string()
    }

    fn supports_insertion(&self) -> bool {
        true
    }

    fn insertion_prompt(&self, _feature_name: &str, options: &ProductOptions) -> Option<String> {
        let window_type = display_value(option_or(options, "window_type", "double_hung"));
        let frame_color = display_value(option_or(options, "frame_color", "white"));
        let glass = display_value(option_or(options, "glass_type", "clear"));
        let grid_pattern = option_or(options, "grid_pattern", "none");

        let mut prompt = format!(
            "Photorealistic window replacement visualization.

Replace the existing windows with new {window_type} windows.

Window specifications:
- Type: {window_type}
- Frame Color: {frame_color}
- Glass: {glass}"
        );

        if grid_pattern != "none" {
            prompt.push_str(&format!("\n- Grid Pattern: {}", display_value(grid_pattern)));
        }

        prompt.push_str(
            "

Render requirements:
- Realistic window frame profiles matching the style
- Natural glass reflections appropriate for the lighting
- Proper shadows on frames from sunlight direction
- Seamless integration with existing trim and siding
- Maintain architectural proportions and symmetry
- No distortion of surrounding house elements

Do not modify anything except the windows themselves.",
        );

        Some(prompt)
    }

    fn refine_prompt(&self) -> String {
        "The previous window replacement was not perfect. Please refine the new windows. Ensure every frame sits flush in its opening and the glass reflections are realistic."
            .to_string()
    }

    fn quality_prompt(&self, _scope: &Scope) -> String {
        format!(
            "Review this window visualization for quality and realism.

Compare Image 1 (reference) with Image 2 (final result).

Check for:
- Realistic window frame appearance and proportions
- Natural glass reflections matching lighting conditions
- Proper integration with existing trim and siding
- No distortion of house structure or surroundings
- Consistent shadow direction with original image
- No visual artifacts or floating elements

Rate quality 0.0 to 1.0:
- Below 0.5: Major issues (wrong proportions, obvious artifacts)
- Below 0.7: Minor issues (slight inconsistencies)
- Above 0.7: Good quality visualization

{QUALITY_JSON_CONTRACT}"
        )
    }
}
