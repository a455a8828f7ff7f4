use crate::scene::{Content, Lighting};
use crate::viewer::ViewerState;

/// Human readable description of a viewer after its assets are in place.
pub fn summary_lines(state: &ViewerState) -> Vec<String> {
    let content = match &state.scene.content {
        Content::DemoCube(_) => "content: demo cube".to_string(),
        Content::Model { asset, .. } => format!(
            "content: model ({} mesh(es), {} triangle(s))",
            asset.meshes.len(),
            asset.triangle_count()
        ),
    };
    let lighting = match &state.scene.lighting {
        Lighting::Environment(map) => format!(
            "lighting: environment map ({}x{})",
            map.source_width, map.source_height
        ),
        Lighting::Basic { .. } => "lighting: ambient + directional".to_string(),
    };
    let rotation = if state.controls.auto_rotate {
        format!("auto-rotate: on (speed {:.2})", state.controls.auto_rotate_speed)
    } else {
        "auto-rotate: off".to_string()
    };
    let (width, height) = state.viewport().drawing_buffer_size();

    vec![
        content,
        lighting,
        format!("camera distance: {:.2}", state.camera.distance()),
        rotation,
        format!("exposure: {:.2}", state.scene.exposure),
        format!("drawing buffer: {width}x{height}"),
    ]
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::ViewerConfig;
    use crate::viewer::HostPreferences;

    #[test]
    fn default_viewer_summary() {
        let state = ViewerState::new(
            ViewerConfig::default(),
            HostPreferences::default(),
            (640, 360),
        );
        assert_eq!(
            summary_lines(&state),
            vec![
                "content: demo cube",
                "lighting: ambient + directional",
                "camera distance: 3.00",
                "auto-rotate: off",
                "exposure: 1.00",
                "drawing buffer: 640x360",
            ]
        );
    }

    #[test]
    fn auto_rotation_is_reported_with_speed() {
        let attributes: HashMap<String, String> = [
            ("data-autorotate".to_string(), "true".to_string()),
            ("data-speed".to_string(), "1.5".to_string()),
        ]
        .into_iter()
        .collect();
        let state = ViewerState::new(
            ViewerConfig::from_attributes(&attributes),
            HostPreferences::default(),
            (640, 360),
        );
        assert!(summary_lines(&state).contains(&"auto-rotate: on (speed 1.50)".to_string()));
    }
}
