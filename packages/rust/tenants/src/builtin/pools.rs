//! Pool Visualizer: in-ground pools and surrounding decks.

use std::collections::BTreeMap;
use std::sync::Arc;

use homeviz_shared::{ProductOptions, Scope, StepConfig, StepType};

use crate::config::{TenantConfig, select};
use crate::prompts::{
    PromptProvider, QUALITY_JSON_CONTRACT, display_value, enabled_features, option_or,
};
use crate::Tenant;

pub fn tenant() -> Tenant {
    let config = TenantConfig {
        tenant_id: "pools".into(),
        display_name: "Pool Visualizer".into(),
        product_schema: vec![
            select(
                "pool_shape",
                "Pool Shape",
                true,
                &[
                    ("rectangle", "Rectangle"),
                    ("freeform", "Freeform"),
                    ("kidney", "Kidney"),
                    ("l_shape", "L-Shape"),
                ],
            ),
            select(
                "pool_surface",
                "Pool Surface",
                true,
                &[
                    ("white_plaster", "White Plaster"),
                    ("pebble_tec_blue", "Pebble Tec Blue"),
                    ("pebble_tec_midnight", "Pebble Tec Midnight"),
                ],
            ),
            select(
                "deck_material",
                "Deck Material",
                true,
                &[
                    ("travertine", "Travertine"),
                    ("concrete", "Concrete"),
                    ("pavers", "Pavers"),
                ],
            ),
            select(
                "water_feature",
                "Water Feature",
                true,
                &[
                    ("none", "None"),
                    ("waterfall", "Waterfall"),
                    ("fountain", "Fountain"),
                    ("infinity_edge", "Infinity Edge"),
                ],
            ),
        ],
        pipeline_steps: vec![
            "cleanup".into(),
            "pool_insertion".into(),
            "deck_insertion".into(),
            "quality_check".into(),
        ],
        step_configs: BTreeMap::from([
            (
                "cleanup".to_string(),
                StepConfig::new(StepType::Cleanup, "Preparing image", 20),
            ),
            (
                "pool_insertion".to_string(),
                StepConfig::new(StepType::Insertion, "Adding Pool", 50).with_feature("pool", "pool"),
            ),
            (
                "deck_insertion".to_string(),
                StepConfig::new(StepType::Insertion, "Adding Deck", 70).with_feature("deck", "deck"),
            ),
            (
                "quality_check".to_string(),
                StepConfig::new(StepType::QualityCheck, "Final Review", 90),
            ),
        ]),
    };

    Tenant::new(config, Arc::new(PoolPrompts))
}

struct PoolPrompts;

impl PromptProvider for PoolPrompts {
    fn cleanup_prompt(&self) -> String {
        "Analyze this image for pool visualization preparation.

Remove any existing pool or water features and prepare the backyard area
for virtual pool insertion. Maintain the natural landscape and architecture."
            .to_string()
    }

    fn supports_insertion(&self) -> bool {
        true
    }

    fn insertion_prompt(&self, feature_name: &str, options: &ProductOptions) -> Option<String> {
        if feature_name == "deck" {
            let deck = display_value(option_or(options, "deck_material", "travertine"));
            return Some(format!(
                "Add a {deck} pool deck surrounding the swimming pool.

The deck should follow the pool outline, sit level with the coping, and
blend naturally with the existing patio and landscape. Keep the pool,
house, and lighting exactly as they are."
            ));
        }

        let shape = display_value(option_or(options, "pool_shape", "rectangle"));
        let surface = display_value(option_or(options, "pool_surface", "pebble_tec_blue"));
        let mut prompt = format!(
            "Add a {shape} shaped swimming pool with {surface} finish.

The pool should blend naturally with the existing landscape and architecture.
Ensure realistic water reflections and appropriate shadowing."
        );

        let water_feature = option_or(options, "water_feature", "none");
        if water_feature != "none" {
            prompt.push_str(&format!(
                "\nInclude a {} water feature.",
                display_value(water_feature)
            ));
        }

        Some(prompt)
    }

    fn refine_prompt(&self) -> String {
        "The previous pool installation was not perfect. Please refine the pool and surrounding hardscape. Ensure the water, coping, and decking look realistic and sit naturally in the yard."
            .to_string()
    }

    fn quality_prompt(&self, scope: &Scope) -> String {
        format!(
            "Review this pool visualization for quality and realism.

Compare Image 1 (reference) with Image 2 (final result).
Features that should be present: {}

Check for:
- Realistic water appearance and reflections
- Proper integration with landscape
- Natural lighting and shadows
- No visual artifacts or inconsistencies

Rate quality 0.0 to 1.0.

{QUALITY_JSON_CONTRACT}",
            enabled_features(scope)
        )
    }
}
