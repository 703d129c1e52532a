//! Boss Security Screens: security doors, window screens, and patio enclosures.

use std::collections::BTreeMap;
use std::sync::Arc;

use homeviz_shared::{ProductOptions, Scope, StepConfig, StepType};

use crate::config::{TenantConfig, select};
use crate::prompts::{
    PromptProvider, QUALITY_JSON_CONTRACT, StructuralPrompts, display_value, enabled_features,
    option_or,
};
use crate::Tenant;

pub fn tenant() -> Tenant {
    let config = TenantConfig {
        tenant_id: "boss".into(),
        display_name: "Boss Security Screens".into(),
        // No opacity category: mesh density and color determine visibility.
        product_schema: vec![
            select(
                "mesh_type",
                "Mesh Type",
                true,
                &[
                    ("10x10_standard", "10x10 Standard"),
                    ("12x12_standard", "12x12 Standard"),
                    ("12x12_american", "12x12 American"),
                ],
            ),
            select(
                "frame_color",
                "Frame Color",
                true,
                &[
                    ("black", "Black"),
                    ("dark_bronze", "Dark Bronze"),
                    ("stucco", "Stucco"),
                    ("white", "White"),
                    ("almond", "Almond"),
                ],
            ),
            select(
                "mesh_color",
                "Mesh Color",
                true,
                &[
                    ("black", "Black (Recommended)"),
                    ("stucco", "Stucco"),
                    ("bronze", "Bronze"),
                ],
            ),
        ],
        // Patio last: it is the largest envelope.
        pipeline_steps: vec![
            "cleanup".into(),
            "build_out".into(),
            "doors".into(),
            "windows".into(),
            "patio".into(),
            "quality_check".into(),
        ],
        step_configs: BTreeMap::from([
            (
                "cleanup".to_string(),
                StepConfig::new(StepType::Cleanup, "Cleaning", 30),
            ),
            (
                "build_out".to_string(),
                StepConfig::new(StepType::StructuralPrep, "Checking Structure", 40),
            ),
            (
                "doors".to_string(),
                StepConfig::new(StepType::Insertion, "Building Doors", 70)
                    .with_feature("entry doors", "doors"),
            ),
            (
                "windows".to_string(),
                StepConfig::new(StepType::Insertion, "Building Windows", 60)
                    .with_feature("windows", "windows"),
            ),
            (
                "patio".to_string(),
                StepConfig::new(StepType::Insertion, "Building Patio", 50)
                    .with_feature("patio enclosure", "patio"),
            ),
            (
                "quality_check".to_string(),
                StepConfig::new(StepType::QualityCheck, "Checking Quality", 90),
            ),
        ]),
    };

    Tenant::new(config, Arc::new(BossPrompts))
}

struct BossPrompts;

fn mesh_physics(mesh_type: &str) -> &'static str {
    match mesh_type {
        "12x12_american" => {
            "Texture: Marine-grade stainless steel mesh. Weave: High-density 12x12 strands per inch. \
             Appearance: Semi-gloss black powder coat. Physics: 75% stronger than standard, subtle moiré pattern."
        }
        "10x10" | "10x10_standard" => {
            "Texture: Standard security mesh. Weave: 10x10 strands per inch. Appearance: Matte black."
        }
        _ => "Texture: Standard security mesh. Weave: 12x12 strands per inch. Appearance: Matte black.",
    }
}

fn structural_narrative(feature_name: &str) -> &'static str {
    let feature = feature_name.to_lowercase();
    if feature.contains("door") {
        "Install security doors with heavy-duty aluminum frames, 3-point locking mechanisms, and no exterior screws."
    } else if feature.contains("patio") {
        "Enclose the patio with floor-to-ceiling security screens, ensuring high visibility and airflow."
    } else {
        "Fit flush-mounted security screens with 0.035-inch diameter stainless steel mesh."
    }
}

impl PromptProvider for BossPrompts {
    fn cleanup_prompt(&self) -> String {
        "TASK: Cleanse the scene.
1. Remove any existing window screens, bug screens, or bars.
2. Ensure the glass is clear and reflective where appropriate.
3. Remove any visual clutter (dirt, cobwebs) from the window/door frames.
4. CRITICAL: Do NOT alter the architecture of the home. Keep the siding, brick, trim, landscaping, and lighting EXACTLY as is.
5. CRITICAL: Do NOT generate a new house. You are EDITING the existing image."
            .to_string()
    }

    fn supports_insertion(&self) -> bool {
        true
    }

    fn insertion_prompt(&self, feature_name: &str, options: &ProductOptions) -> Option<String> {
        let mesh_type = options
            .get("mesh_type")
            .map(String::as_str)
            .unwrap_or("12x12_standard");
        let frame_color = options
            .get("frame_color")
            .or_else(|| options.get("color"))
            .map(|c| display_value(c))
            .unwrap_or_else(|| "Black".to_string());
        let mesh_color = display_value(option_or(options, "mesh_color", "black"));

        Some(format!(
            "{physics}

TASK:
Install security screens on the {feature_name} of the User Image.

CONFIGURATION:
Feature: {feature_name}
Mesh: {mesh_type}
Frame Color: {frame_color}
Mesh Color: {mesh_color}

{structure}

CONSTRAINTS:
1. CRITICAL: Do NOT generate a new house. You are EDITING the existing image.
2. Keep the siding, brick, trim, landscaping, and lighting EXACTLY as is.
3. Only change the pixels inside the window/door openings to apply the screen and frame.",
            physics = mesh_physics(mesh_type),
            structure = structural_narrative(feature_name),
        ))
    }

    fn quality_prompt(&self, scope: &Scope) -> String {
        format!(
            "Analyze the quality of the security screen installation.

Compare Image 1 (reference, before screens) with Image 2 (final result).
Openings that should be screened: {}

Check against these constraints:
1. Is the fabric color consistent with a screen?
2. Is the opacity consistent with the chosen mesh?
3. Are ALL requested openings screened?
4. Is the image clean?
5. Are there any structural hallucinations?

Rate quality 0.0 to 1.0. Below 0.7 means the installation must be refined.

{QUALITY_JSON_CONTRACT}",
            enabled_features(scope)
        )
    }

    fn structural_prompts(&self) -> Option<StructuralPrompts> {
        Some(StructuralPrompts {
            question: "Analyze this image of a house. Does the patio or outdoor area require structural build-out (like pillars, beams, or headers) to support a motorized screen? Answer with YES or NO only."
                .to_string(),
            build_out: "Analyze the previous image. Add structural build-outs (columns/headers) where indicated to support screens. Ensure the new structure matches the house texture."
                .to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_prompt_is_generic_over_features() {
        let options = ProductOptions::from([("color".to_string(), "Black".to_string())]);
        let prompt = BossPrompts.insertion_prompt("windows", &options).unwrap();
        assert!(!prompt.is_empty());
        assert!(prompt.contains("Frame Color: Black"));
        assert!(prompt.contains("flush-mounted"));
    }

    #[test]
    fn door_and_patio_narratives() {
        let options = ProductOptions::new();
        let doors = BossPrompts.insertion_prompt("entry doors", &options).unwrap();
        assert!(doors.contains("3-point locking"));
        let patio = BossPrompts.insertion_prompt("patio enclosure", &options).unwrap();
        assert!(patio.contains("floor-to-ceiling"));
    }

    #[test]
    fn build_out_runs_before_insertions() {
        let tenant = tenant();
        assert_eq!(tenant.config.pipeline_steps[1], "build_out");
        assert_eq!(
            tenant.config.step_config("build_out").unwrap().step_type,
            Some(StepType::StructuralPrep)
        );
        let prompts = BossPrompts.structural_prompts().unwrap();
        assert!(prompts.question.contains("YES or NO"));
        assert!(prompts.build_out.contains("columns/headers"));
    }

    #[test]
    fn american_mesh_physics() {
        let options =
            ProductOptions::from([("mesh_type".to_string(), "12x12_american".to_string())]);
        let prompt = BossPrompts.insertion_prompt("windows", &options).unwrap();
        assert!(prompt.contains("Marine-grade"));
    }
}
