//! Startup of a single viewer on whatever hosts it.
//!
//! A page runs one [`launch`] per hero canvas. Each launch owns its viewer
//! and reports only to its own host, so a failing canvas never touches the
//! others.

use std::future::Future;

use log::{error, info};

use crate::config::ViewerConfig;
use crate::viewer::ViewerStatus;

/// The surface a viewer lives on: a browser canvas, a desktop window.
pub trait ViewerHost {
    /// Name used in log lines.
    fn label(&self) -> String;

    fn config(&self) -> ViewerConfig;

    /// Publishes the completion state of this host's viewer.
    fn set_status(&self, status: &ViewerStatus);
}

/// Starts a viewer for `host` with its configuration.
///
/// The host ends up `Ready` with the running viewer returned, or `Failed`
/// with the error message and `None`.
pub async fn launch<H, V, F, Fut>(host: &H, start: F) -> Option<V>
where
    H: ViewerHost + ?Sized,
    F: FnOnce(ViewerConfig) -> Fut,
    Fut: Future<Output = anyhow::Result<V>>,
{
    match start(host.config()).await {
        Ok(viewer) => {
            info!("hero viewer on {} ready", host.label());
            host.set_status(&ViewerStatus::Ready);
            Some(viewer)
        }
        Err(err) => {
            error!("hero viewer on {} failed: {err:#}", host.label());
            host.set_status(&ViewerStatus::Failed(err.to_string()));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::sync::Arc;

    use anyhow::anyhow;
    use pollster::block_on;

    use super::*;
    use crate::assets::testing::MemoryFetcher;
    use crate::model::fixtures::TRIANGLE_GLTF;
    use crate::model::NoMeshDecoder;
    use crate::viewer::{HostPreferences, ViewerState};

    struct RecordingHost {
        name: &'static str,
        attributes: HashMap<String, String>,
        statuses: RefCell<Vec<ViewerStatus>>,
    }

    impl RecordingHost {
        fn new(name: &'static str, pairs: &[(&str, &str)]) -> Self {
            Self {
                name,
                attributes: pairs
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .collect(),
                statuses: RefCell::new(Vec::new()),
            }
        }
    }

    impl ViewerHost for RecordingHost {
        fn label(&self) -> String {
            self.name.to_string()
        }

        fn config(&self) -> ViewerConfig {
            ViewerConfig::from_attributes(&self.attributes)
        }

        fn set_status(&self, status: &ViewerStatus) {
            self.statuses.borrow_mut().push(status.clone());
        }
    }

    async fn start_state(
        config: ViewerConfig,
        fetcher: &MemoryFetcher,
    ) -> anyhow::Result<ViewerState> {
        let mut state = ViewerState::new(config, HostPreferences::default(), (800, 400));
        state.load_assets(fetcher, &NoMeshDecoder).await;
        Ok(state)
    }

    #[test]
    fn failing_canvas_does_not_stop_its_neighbour() {
        let fetcher = MemoryFetcher::default().with("/hero.gltf", TRIANGLE_GLTF);
        let broken = RecordingHost::new("broken", &[("data-model", "/hero.gltf")]);
        let working = RecordingHost::new("working", &[("data-model", "/hero.gltf")]);

        let failed: Option<ViewerState> = block_on(launch(&broken, |_| async {
            Err(anyhow!("no adapter found"))
        }));
        let running = block_on(launch(&working, |config| start_state(config, &fetcher)));

        assert!(failed.is_none());
        assert_eq!(
            *broken.statuses.borrow(),
            vec![ViewerStatus::Failed("no adapter found".into())]
        );
        assert_eq!(*working.statuses.borrow(), vec![ViewerStatus::Ready]);
        let running = running.unwrap();
        assert!(!running.scene.content.is_demo_cube());
    }

    #[test]
    fn each_viewer_reads_its_own_host_config() {
        let fetcher = MemoryFetcher::default();
        let still = RecordingHost::new("still", &[]);
        let spinning = RecordingHost::new(
            "spinning",
            &[("data-autorotate", "true"), ("data-speed", "4")],
        );

        let still = block_on(launch(&still, |config| start_state(config, &fetcher))).unwrap();
        let spinning =
            block_on(launch(&spinning, |config| start_state(config, &fetcher))).unwrap();

        assert!(!still.controls.auto_rotate);
        assert!(spinning.controls.auto_rotate);
        assert_eq!(spinning.controls.auto_rotate_speed, 4.0);
    }

    #[test]
    fn dragging_one_viewer_leaves_the_other_camera_alone() {
        let fetcher = MemoryFetcher::default();
        let first_host = RecordingHost::new("first", &[]);
        let second_host = RecordingHost::new("second", &[]);
        let mut first =
            block_on(launch(&first_host, |config| start_state(config, &fetcher))).unwrap();
        let mut second =
            block_on(launch(&second_host, |config| start_state(config, &fetcher))).unwrap();
        let resting = second.camera.position;

        let input = first.input();
        input.press();
        input.move_by(120.0, 0.0);
        input.release();
        for _ in 0..10 {
            first.tick();
            second.tick();
        }

        assert!(first.camera.position.distance(resting) > 1e-3);
        assert!(second.camera.position.distance(resting) < 1e-5);
        assert!(!Arc::ptr_eq(&first.input(), &second.input()));
    }
}
