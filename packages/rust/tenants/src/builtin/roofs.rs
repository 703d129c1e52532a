//! Roof Visualizer: roof replacement on an existing home.

use std::collections::BTreeMap;
use std::sync::Arc;

use homeviz_shared::{ProductOptions, Scope, StepConfig, StepType};

use crate::config::{TenantConfig, select};
use crate::prompts::{PromptProvider, QUALITY_JSON_CONTRACT, display_value, option_or};
use crate::Tenant;

pub fn tenant() -> Tenant {
    let config = TenantConfig {
        tenant_id: "roofs".into(),
        display_name: "Roof Visualizer".into(),
        product_schema: vec![
            select(
                "roof_material",
                "Roof Material",
                true,
                &[
                    ("asphalt_shingle", "Asphalt Shingle"),
                    ("metal", "Metal"),
                    ("tile_clay", "Clay Tile"),
                    ("tile_concrete", "Concrete Tile"),
                    ("slate", "Slate"),
                    ("wood_shake", "Wood Shake"),
                ],
            ),
            select(
                "roof_color",
                "Roof Color",
                true,
                &[
                    ("charcoal", "Charcoal"),
                    ("black", "Black"),
                    ("brown", "Brown"),
                    ("gray", "Gray"),
                    ("terracotta", "Terracotta"),
                    ("weathered_wood", "Weathered Wood"),
                ],
            ),
            select(
                "roof_style",
                "Roof Style",
                false,
                &[
                    ("dimensional", "Dimensional/Architectural"),
                    ("3_tab", "3-Tab"),
                    ("standing_seam", "Standing Seam"),
                    ("spanish", "Spanish Tile"),
                ],
            ),
        ],
        pipeline_steps: vec![
            "cleanup".into(),
            "roof_insertion".into(),
            "quality_check".into(),
        ],
        step_configs: BTreeMap::from([
            (
                "cleanup".to_string(),
                StepConfig::new(StepType::Cleanup, "Preparing image", 20),
            ),
            (
                "roof_insertion".to_string(),
                StepConfig::new(StepType::Insertion, "Visualizing Roof", 70)
                    .with_feature("roof", "roof"),
            ),
            (
                "quality_check".to_string(),
                StepConfig::new(StepType::QualityCheck, "Final Review", 90),
            ),
        ]),
    };

    Tenant::new(config, Arc::new(RoofPrompts))
}

struct RoofPrompts;

impl PromptProvider for RoofPrompts {
    fn cleanup_prompt(&self) -> String {
        "Analyze this image for roof visualization preparation.

Clean the image by:
- Ensuring clear visibility of the entire roof surface
- Removing any temporary items (tarps, equipment)
- Maintaining natural lighting and sky conditions

PRESERVE EXACTLY:
- House structure and architecture
- Existing gutters and trim
- Chimneys, vents, and skylights
- Surrounding landscape

Output the cleaned image maintaining original perspective."
            .to_string()
    }

    fn supports_insertion(&self) -> bool {
        true
    }

    fn insertion_prompt(&self, _feature_name: &str, options: &ProductOptions) -> Option<String> {
        let material = display_value(option_or(options, "roof_material", "asphalt_shingle"));
        let color = display_value(option_or(options, "roof_color", "charcoal"));
        let style = display_value(option_or(options, "roof_style", "dimensional"));

        Some(format!(
            "Photorealistic roof replacement visualization.

Replace the existing roof with new {material} roofing.

Roof specifications:
- Material: {material}
- Color: {color}
- Style: {style}

Render requirements:
- Realistic texture matching the material type
- Natural weathering and dimension appropriate to material
- Proper shadow patterns from roof planes
- Seamless integration at edges, ridges, and valleys
- Maintain existing roof geometry and pitch
- Preserve all vents, chimneys, and skylights
- Natural color variation (not perfectly uniform)

Do not modify house structure, only the roof surface material."
        ))
    }

    fn refine_prompt(&self) -> String {
        "The previous roof replacement was not perfect. Please refine the roof surface. Ensure the new material covers every roof plane and the texture is realistic."
            .to_string()
    }

    fn quality_prompt(&self, _scope: &Scope) -> String {
        format!(
            "Review this roof visualization for quality and realism.

Compare Image 1 (reference) with Image 2 (final result).

Check for:
- Realistic roof texture and material appearance
- Proper coverage of entire roof surface
- Natural color variation (not artificially uniform)
- Correct shadow patterns
- Preserved roof geometry and pitch
- All vents, chimneys, skylights intact
- No floating or disconnected elements

Rate quality 0.0 to 1.0:
- Below 0.5: Major issues (wrong material, incomplete coverage)
- Below 0.7: Minor issues (slight texture problems)
- Above 0.7: Good quality visualization

{QUALITY_JSON_CONTRACT}"
        )
    }
}
