//! Camera resolver
//!
//! Keeps the live view transform current. At session start the process's camera
//! list is scanned once: the main camera is found by exact name (its absence is
//! fatal), and every camera that looks like an optic becomes a candidate. Each
//! tick then:
//!
//! 1. takes the local actor's aim state from the caller,
//! 2. while aiming with no confirmed optic, validates the unchecked candidates
//!    (all in one scatter round); the first that passes is kept for the session,
//!    and if none pass the main camera is used until the search is re-armed,
//! 3. reads the relevant camera's matrix (plus the main camera's field of view
//!    and aspect ratio when scoped) in one scatter round,
//! 4. publishes the result to the [`LiveView`], keeping the previous frame's
//!    values if the read failed.

mod classify;
mod view;

pub use classify::{CameraClassifier, NamePatternClassifier, ValidationBand};
pub use view::LiveView;

use crate::platform::{is_user_address, MemoryReader};
use crate::projection::ViewTransform;
use crate::scatter::ScatterPipeline;
use crate::utils::OnceLog;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Offsets inside camera objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraLayout {
    /// Camera component to its game object
    pub game_object_offset: usize,
    /// Game object to its name pointer
    pub name_offset: usize,
    /// Column-major 4x4 view-projection matrix inside the camera
    pub matrix_offset: usize,
    /// Vertical field of view in degrees (f32)
    pub fov_offset: usize,
    /// Aspect ratio (f32)
    pub aspect_offset: usize,
}

impl Default for CameraLayout {
    fn default() -> Self {
        Self {
            game_object_offset: 0x30,
            name_offset: 0x60,
            matrix_offset: 0xDC,
            fov_offset: 0x15C,
            aspect_offset: 0x4F0,
        }
    }
}

/// Camera resolver tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Offsets inside camera objects
    pub layout: CameraLayout,
    /// Default name patterns
    pub names: NamePatternClassifier,
    /// Optic matrix sanity band
    pub validation: ValidationBand,
    /// Bytes read per camera name
    pub name_max_len: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            layout: CameraLayout::default(),
            names: NamePatternClassifier::default(),
            validation: ValidationBand::default(),
            name_max_len: 64,
        }
    }
}

/// The process's array of camera pointers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraList {
    /// Address of the first pointer
    pub base: usize,
    /// Number of pointers
    pub count: usize,
}

/// Local actor aim state, supplied by the caller each tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AimState {
    /// Aiming down sights
    pub aiming: bool,
    /// Looking through a magnified optic
    pub scoped: bool,
}

/// A possible optic camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraCandidate {
    /// Camera object address
    pub address: usize,
    /// Validation has run on this candidate (pass or fail)
    pub validated: bool,
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraStats {
    /// Ticks run this session
    pub ticks: u64,
    /// Candidates put through validation
    pub validations: u64,
    /// Ticks that kept the previous transform
    pub stale_ticks: u64,
}

#[derive(Debug)]
struct CameraSession {
    default_camera: usize,
    candidates: Vec<CameraCandidate>,
    confirmed_optic: Option<usize>,
    /// No candidate passed; use the main camera until re-armed
    optic_exhausted: bool,
}

/// Maintains the live camera transform for one session
pub struct CameraResolver {
    config: CameraConfig,
    classifier: Box<dyn CameraClassifier>,
    session: Option<CameraSession>,
    view: Arc<LiveView>,
    stats: CameraStats,
    errors: OnceLog,
}

impl std::fmt::Debug for CameraResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraResolver")
            .field("session", &self.session)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl CameraResolver {
    /// Resolver using the name patterns from `config`
    pub fn new(config: CameraConfig) -> Self {
        let classifier = Box::new(config.names.clone());
        Self::with_classifier(config, classifier)
    }

    /// Resolver with a custom camera classifier
    pub fn with_classifier(config: CameraConfig, classifier: Box<dyn CameraClassifier>) -> Self {
        Self {
            config,
            classifier,
            session: None,
            view: Arc::new(LiveView::new()),
            stats: CameraStats::default(),
            errors: OnceLog::new(),
        }
    }

    /// Shared handle to the live view for consumers on other threads
    pub fn view(&self) -> Arc<LiveView> {
        self.view.clone()
    }

    /// This frame's view transform
    pub fn current_view_transform(&self) -> ViewTransform {
        self.view.transform()
    }

    /// Main camera of the current session
    pub fn default_camera(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.default_camera)
    }

    /// Optic candidates of the current session
    pub fn candidates(&self) -> &[CameraCandidate] {
        self.session
            .as_ref()
            .map(|s| s.candidates.as_slice())
            .unwrap_or(&[])
    }

    /// Optic camera that passed validation, if any
    pub fn confirmed_optic(&self) -> Option<usize> {
        self.session.as_ref().and_then(|s| s.confirmed_optic)
    }

    /// No candidate passed and the search waits for a re-arm
    pub fn is_optic_search_exhausted(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.optic_exhausted)
    }

    /// Counters since the last reset
    pub fn stats(&self) -> CameraStats {
        self.stats
    }

    /// Scan the camera list and fix the camera set for this session
    ///
    /// Fails with [`Error::NoDefaultCamera`] when the main camera is missing;
    /// the resolver then stays without a session.
    pub fn start_session<R: MemoryReader>(&mut self, reader: &R, list: CameraList) -> Result<()> {
        self.reset();

        let cameras = self.read_camera_names(reader, list)?;
        debug!(cameras = cameras.len(), "camera list read");

        let default_camera = cameras
            .iter()
            .find(|(_, name)| self.classifier.is_default(name))
            .map(|(address, _)| *address)
            .ok_or_else(|| Error::NoDefaultCamera(self.config.names.default_name.clone()))?;

        let candidates: Vec<CameraCandidate> = cameras
            .iter()
            .filter(|(address, name)| {
                *address != default_camera && self.classifier.is_optic_candidate(name)
            })
            .map(|(address, _)| CameraCandidate {
                address: *address,
                validated: false,
            })
            .collect();

        info!(
            default_camera = format_args!("0x{:X}", default_camera),
            candidates = candidates.len(),
            "camera session started"
        );

        self.session = Some(CameraSession {
            default_camera,
            candidates,
            confirmed_optic: None,
            optic_exhausted: false,
        });

        Ok(())
    }

    /// Refresh the live view
    ///
    /// An unreadable matrix keeps the previous frame's view. A hard I/O failure
    /// is returned, also leaving the previous view in place.
    pub fn tick<R: MemoryReader>(&mut self, reader: &R, aim: AimState) -> Result<()> {
        if self.session.is_none() {
            return Err(Error::SessionNotStarted);
        }
        self.stats.ticks += 1;

        if aim.aiming && self.needs_optic_search() {
            self.validate_candidates(reader)?;
        }

        let Some(session) = self.session.as_ref() else {
            return Err(Error::SessionNotStarted);
        };

        let optic = session.confirmed_optic.filter(|_| aim.scoped);
        let camera = optic.unwrap_or(session.default_camera);
        let scoped = optic.is_some();

        let layout = self.config.layout;
        let matrix_at = camera + layout.matrix_offset;
        let fov_at = session.default_camera + layout.fov_offset;
        let aspect_at = session.default_camera + layout.aspect_offset;

        let mut matrix = None;
        let mut lens = None;

        let mut pipeline = ScatterPipeline::new();
        let round = pipeline.add_round();
        pipeline.round(round).prepare_read::<[f32; 16]>(matrix_at);
        if scoped {
            pipeline.round(round).prepare_read::<f32>(fov_at);
            pipeline.round(round).prepare_read::<f32>(aspect_at);
        }
        pipeline.round(round).on_completed(|results, _| {
            matrix = results.try_read::<[f32; 16]>(matrix_at);
            if scoped {
                lens = results
                    .try_read::<f32>(fov_at)
                    .zip(results.try_read::<f32>(aspect_at));
            }
        });
        pipeline.execute(reader)?;

        let transform = matrix
            .map(ViewTransform::from_column_major)
            .filter(|t| t.rows.iter().flatten().all(|v| v.is_finite()));

        let Some(transform) = transform else {
            self.stats.stale_ticks += 1;
            if self.errors.first("matrix-unreadable") {
                debug!(camera = format_args!("0x{:X}", camera), "view matrix unreadable, keeping last frame");
            }
            return Ok(());
        };

        if scoped && lens.is_none() {
            // The magnification correction would be wrong without this frame's lens
            self.stats.stale_ticks += 1;
            return Ok(());
        }

        self.view.store_transform(&transform);
        self.view.set_scoped(scoped);
        if let Some((fov, aspect)) = lens {
            self.view.store_lens(fov, aspect);
        }

        Ok(())
    }

    /// Let the optic search run again after a fallback
    ///
    /// Called when the aim or weapon state changes upstream. A confirmed optic
    /// is kept for the rest of the session regardless.
    pub fn rearm_optic_search(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };

        if session.confirmed_optic.is_some() || !session.optic_exhausted {
            return;
        }

        debug!("optic search re-armed");
        session.optic_exhausted = false;
        for candidate in &mut session.candidates {
            candidate.validated = false;
        }
    }

    /// Drop the session and zero the live view
    ///
    /// Must not race a `tick`; `&mut self` enforces that within one owner.
    pub fn reset(&mut self) {
        self.session = None;
        self.view.clear();
        self.stats = CameraStats::default();
        self.errors.clear();
    }

    fn needs_optic_search(&self) -> bool {
        self.session.as_ref().is_some_and(|s| {
            s.confirmed_optic.is_none()
                && !s.optic_exhausted
                && s.candidates.iter().any(|c| !c.validated)
        })
    }

    /// Validate every unchecked candidate against one scatter round
    fn validate_candidates<R: MemoryReader>(&mut self, reader: &R) -> Result<()> {
        let matrix_offset = self.config.layout.matrix_offset;
        let band = self.config.validation;

        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        let pending: Vec<usize> = session
            .candidates
            .iter()
            .filter(|c| !c.validated)
            .map(|c| c.address)
            .collect();

        let mut passed = Vec::new();
        let mut pipeline = ScatterPipeline::new();
        let round = pipeline.add_round();
        for &address in &pending {
            pipeline.round(round).prepare_read::<[f32; 16]>(address + matrix_offset);
        }
        pipeline.round(round).on_completed(|results, _| {
            for &address in &pending {
                let ok = results
                    .try_read::<[f32; 16]>(address + matrix_offset)
                    .map(ViewTransform::from_column_major)
                    .is_some_and(|t| band.accepts(&t));
                passed.push((address, ok));
            }
        });
        pipeline.execute(reader)?;

        for (address, ok) in passed {
            let Some(candidate) = session.candidates.iter_mut().find(|c| c.address == address) else {
                continue;
            };
            candidate.validated = true;
            self.stats.validations += 1;

            if ok {
                info!(camera = format_args!("0x{:X}", address), "optic camera confirmed");
                session.confirmed_optic = Some(address);
                break;
            }
        }

        if session.confirmed_optic.is_none() {
            session.optic_exhausted = true;
            if self.errors.first("optic-fallback") {
                warn!(
                    candidates = session.candidates.len(),
                    "no optic camera passed validation, using the main camera"
                );
            }
        }

        Ok(())
    }

    /// `(camera, name)` for every readable camera in the list
    fn read_camera_names<R: MemoryReader>(
        &self,
        reader: &R,
        list: CameraList,
    ) -> Result<Vec<(usize, String)>> {
        if !is_user_address(list.base) || list.count == 0 {
            return Ok(Vec::new());
        }

        let cameras: Vec<usize> = match reader.read_pointer_array(list.base, list.count) {
            Ok(entries) => entries.into_iter().filter(|&c| is_user_address(c)).collect(),
            Err(e) if e.is_hard() => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "camera list unreadable");
                return Ok(Vec::new());
            }
        };

        let layout = self.config.layout;
        let len = self.config.name_max_len;
        let named = RefCell::new(Vec::new());
        let named_ref = &named;

        let mut pipeline = ScatterPipeline::new();
        let first = pipeline.add_round();
        pipeline.add_round();
        pipeline.add_round();

        for &camera in &cameras {
            pipeline.round(first).prepare_read::<u64>(camera + layout.game_object_offset);
        }

        pipeline.round(first).on_completed(move |results, next| {
            let objects: Vec<(usize, usize)> = cameras
                .into_iter()
                .filter_map(|camera| {
                    results
                        .try_read_pointer(camera + layout.game_object_offset)
                        .map(|object| (camera, object))
                })
                .collect();

            for &(_, object) in &objects {
                next.prepare_read::<u64>(object + layout.name_offset);
            }

            next.on_completed(move |results, next| {
                let names: Vec<(usize, usize)> = objects
                    .into_iter()
                    .filter_map(|(camera, object)| {
                        results
                            .try_read_pointer(object + layout.name_offset)
                            .map(|name| (camera, name))
                    })
                    .collect();

                for &(_, name) in &names {
                    next.prepare(name, len);
                }

                next.on_completed(move |results, _| {
                    let mut named = named_ref.borrow_mut();
                    for (camera, name) in names {
                        if let Some(name) = results.try_read_string(name, len) {
                            named.push((camera, name));
                        }
                    }
                });
            });
        });

        pipeline.execute(reader)?;

        Ok(named.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::platform::mock::MockPlatform;
    use crate::projection::tests::forward_camera;
    use crate::projection::{ProjectionConfig, Projector, Viewport};

    const LIST: usize = 0x300000;
    const CAMERAS: usize = 0x400000;

    pub(crate) fn camera_address(index: usize) -> usize {
        CAMERAS + index * 0x1000
    }

    fn write_matrix(platform: &MockPlatform, camera: usize, transform: &ViewTransform) {
        platform.write_value(camera + CameraLayout::default().matrix_offset, &transform.to_column_major());
    }

    /// Cameras named in order, each with a live forward-looking matrix
    pub(crate) fn build_cameras(platform: &MockPlatform, names: &[&str]) -> CameraList {
        let layout = CameraLayout::default();
        let mut pointers = Vec::new();

        for (i, name) in names.iter().enumerate() {
            let camera = camera_address(i);
            let object = camera + 0x800;
            let string = camera + 0x900;

            platform.write_memory(camera, &[0u8; 0x1000]);
            platform.write_pointer(camera + layout.game_object_offset, object);
            platform.write_pointer(object + layout.name_offset, string);
            platform.write_cstring(string, name);
            write_matrix(platform, camera, &forward_camera());
            platform.write_value(camera + layout.fov_offset, &70.0f32);
            platform.write_value(camera + layout.aspect_offset, &(16.0f32 / 9.0));

            pointers.extend_from_slice(&(camera as u64).to_le_bytes());
        }

        platform.write_memory(LIST, &pointers);
        CameraList {
            base: LIST,
            count: names.len(),
        }
    }

    /// Scaled copy of the forward camera so tests can tell matrices apart
    fn scaled_camera(factor: f32) -> ViewTransform {
        let mut transform = forward_camera();
        for row in transform.rows.iter_mut().take(3) {
            for value in row.iter_mut() {
                *value *= factor;
            }
        }
        transform
    }

    fn started(platform: &MockPlatform, names: &[&str]) -> CameraResolver {
        let list = build_cameras(platform, names);
        let mut resolver = CameraResolver::new(CameraConfig::default());
        resolver.start_session(platform, list).unwrap();
        platform.reset_counters();
        resolver
    }

    const AIMING_SCOPED: AimState = AimState {
        aiming: true,
        scoped: true,
    };

    #[test]
    fn test_session_discovers_cameras() {
        let platform = MockPlatform::new();
        let resolver = started(
            &platform,
            &["Minimap", "BaseOpticCamera(Clone)", "FPS Camera", "BaseOpticCamera(Clone)"],
        );

        assert_eq!(resolver.default_camera(), Some(camera_address(2)));
        let candidates: Vec<usize> = resolver.candidates().iter().map(|c| c.address).collect();
        assert_eq!(candidates, vec![camera_address(1), camera_address(3)]);
        assert!(resolver.candidates().iter().all(|c| !c.validated));
    }

    #[test]
    fn test_discovery_is_batched() {
        let platform = MockPlatform::new();
        let list = build_cameras(&platform, &["A", "B", "FPS Camera", "C", "D", "E"]);
        platform.reset_counters();

        let mut resolver = CameraResolver::new(CameraConfig::default());
        resolver.start_session(&platform, list).unwrap();

        // Camera array, then object, name pointer and name string rounds
        assert_eq!(platform.read_calls(), 1);
        assert_eq!(platform.scatter_calls(), 3);
    }

    #[test]
    fn test_missing_default_camera_is_fatal() {
        let platform = MockPlatform::new();
        let list = build_cameras(&platform, &["Minimap", "BaseOpticCamera(Clone)"]);
        let mut resolver = CameraResolver::new(CameraConfig::default());

        let err = resolver.start_session(&platform, list).unwrap_err();

        assert!(matches!(err, Error::NoDefaultCamera(_)));
        assert_eq!(resolver.default_camera(), None);
        assert!(matches!(
            resolver.tick(&platform, AimState::default()),
            Err(Error::SessionNotStarted)
        ));
    }

    #[test]
    fn test_tick_reads_default_camera_in_one_round() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera"]);
        write_matrix(&platform, camera_address(0), &scaled_camera(2.0));

        resolver.tick(&platform, AimState::default()).unwrap();

        assert_eq!(platform.scatter_calls(), 1);
        assert_eq!(platform.scatter_log()[0].len(), 1);
        assert_eq!(resolver.current_view_transform(), scaled_camera(2.0));
        assert!(!resolver.view().snapshot().scoped);
    }

    #[test]
    fn test_confirmed_optic_is_never_revalidated() {
        let platform = MockPlatform::new();
        let mut resolver = started(
            &platform,
            &["FPS Camera", "BaseOpticCamera(Clone)", "BaseOpticCamera(Clone)"],
        );
        // First candidate has a near-zero basis
        write_matrix(&platform, camera_address(1), &scaled_camera(1e-6));
        write_matrix(&platform, camera_address(2), &scaled_camera(3.0));

        resolver.tick(&platform, AIMING_SCOPED).unwrap();

        assert_eq!(resolver.confirmed_optic(), Some(camera_address(2)));
        assert_eq!(resolver.stats().validations, 2);
        assert!(resolver.candidates().iter().all(|c| c.validated));

        platform.reset_counters();
        for _ in 0..10 {
            resolver.tick(&platform, AIMING_SCOPED).unwrap();
        }

        assert_eq!(resolver.stats().validations, 2);
        assert_eq!(platform.scatter_calls(), 10);
        let first_matrix = camera_address(1) + CameraLayout::default().matrix_offset;
        assert!(platform
            .scatter_log()
            .iter()
            .flatten()
            .all(|r| r.address != first_matrix));
    }

    #[test]
    fn test_scoped_tick_samples_optic_with_main_lens() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera", "BaseOpticCamera(Clone)"]);
        write_matrix(&platform, camera_address(1), &scaled_camera(4.0));

        // Validation round, then the sampling round
        resolver.tick(&platform, AIMING_SCOPED).unwrap();
        assert_eq!(platform.scatter_calls(), 2);
        // Matrix, fov and aspect in one round
        assert_eq!(platform.scatter_log()[1].len(), 3);

        let snapshot = resolver.view().snapshot();
        assert!(snapshot.scoped);
        assert_eq!(snapshot.transform, scaled_camera(4.0));
        assert_eq!(snapshot.fov, 70.0);
        assert_eq!(snapshot.aspect, 16.0 / 9.0);

        // Aiming without magnification uses the main camera again
        resolver
            .tick(
                &platform,
                AimState {
                    aiming: true,
                    scoped: false,
                },
            )
            .unwrap();
        assert_eq!(resolver.current_view_transform(), forward_camera());
        assert!(!resolver.view().snapshot().scoped);
    }

    #[test]
    fn test_fallback_until_rearmed() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera", "BaseOpticCamera(Clone)"]);
        write_matrix(&platform, camera_address(1), &ViewTransform::ZERO);

        resolver.tick(&platform, AIMING_SCOPED).unwrap();
        assert!(resolver.is_optic_search_exhausted());
        assert_eq!(resolver.confirmed_optic(), None);
        assert_eq!(resolver.current_view_transform(), forward_camera());

        for _ in 0..5 {
            resolver.tick(&platform, AIMING_SCOPED).unwrap();
        }
        assert_eq!(resolver.stats().validations, 1);

        // The optic comes alive after a weapon change
        write_matrix(&platform, camera_address(1), &scaled_camera(2.0));
        resolver.rearm_optic_search();
        resolver.tick(&platform, AIMING_SCOPED).unwrap();

        assert_eq!(resolver.stats().validations, 2);
        assert_eq!(resolver.confirmed_optic(), Some(camera_address(1)));
        assert_eq!(resolver.current_view_transform(), scaled_camera(2.0));
    }

    #[test]
    fn test_no_validation_without_aiming() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera", "BaseOpticCamera(Clone)"]);

        resolver.tick(&platform, AimState::default()).unwrap();

        assert_eq!(resolver.stats().validations, 0);
        assert_eq!(platform.scatter_calls(), 1);
    }

    #[test]
    fn test_failed_read_keeps_last_frame() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera"]);

        resolver.tick(&platform, AimState::default()).unwrap();
        let before = resolver.current_view_transform();
        assert_eq!(before, forward_camera());

        // Matrix becomes garbage
        let mut broken = forward_camera();
        broken.rows[1][1] = f32::NAN;
        write_matrix(&platform, camera_address(0), &broken);
        resolver.tick(&platform, AimState::default()).unwrap();
        assert_eq!(resolver.current_view_transform(), before);

        // Camera memory disappears
        platform.unmap(camera_address(0));
        resolver.tick(&platform, AimState::default()).unwrap();
        assert_eq!(resolver.current_view_transform(), before);

        // Transport failure surfaces but still keeps the frame
        platform.set_fail_hard(true);
        assert!(matches!(
            resolver.tick(&platform, AimState::default()),
            Err(Error::Platform(_))
        ));
        assert_eq!(resolver.current_view_transform(), before);
        assert_eq!(resolver.stats().stale_ticks, 2);
    }

    #[test]
    fn test_reset_matches_fresh_instance() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera", "BaseOpticCamera(Clone)"]);
        write_matrix(&platform, camera_address(1), &scaled_camera(2.0));
        resolver.tick(&platform, AIMING_SCOPED).unwrap();
        assert!(resolver.confirmed_optic().is_some());

        resolver.reset();

        let fresh = CameraResolver::new(CameraConfig::default());
        assert_eq!(resolver.default_camera(), fresh.default_camera());
        assert_eq!(resolver.candidates(), fresh.candidates());
        assert_eq!(resolver.confirmed_optic(), None);
        assert!(!resolver.is_optic_search_exhausted());
        assert_eq!(resolver.stats(), CameraStats::default());
        assert!(resolver.current_view_transform().is_zero());
        assert_eq!(resolver.view().snapshot(), fresh.view().snapshot());
        assert!(matches!(
            resolver.tick(&platform, AimState::default()),
            Err(Error::SessionNotStarted)
        ));
    }

    #[test]
    fn test_custom_classifier() {
        struct Prefix;
        impl CameraClassifier for Prefix {
            fn is_default(&self, name: &str) -> bool {
                name == "Main"
            }
            fn is_optic_candidate(&self, name: &str) -> bool {
                name.starts_with("Scope")
            }
        }

        let platform = MockPlatform::new();
        let list = build_cameras(&platform, &["Scope_4x", "Main", "FPS Camera"]);
        let mut resolver = CameraResolver::with_classifier(CameraConfig::default(), Box::new(Prefix));
        resolver.start_session(&platform, list).unwrap();

        assert_eq!(resolver.default_camera(), Some(camera_address(1)));
        assert_eq!(resolver.candidates().len(), 1);
        assert_eq!(resolver.candidates()[0].address, camera_address(0));
    }

    #[test]
    fn test_projector_follows_live_view() {
        let platform = MockPlatform::new();
        let mut resolver = started(&platform, &["FPS Camera"]);
        let config = ProjectionConfig::default();
        let projector = Projector::new(resolver.view(), Viewport::new(800.0, 600.0), config.clone());
        let ahead = Vec3::new(0.0, 0.0, config.reference_distance);

        // Nothing until the first tick
        assert!(!projector.project(ahead, true, 0.0).valid);

        resolver.tick(&platform, AimState::default()).unwrap();

        let result = projector.project(ahead, true, 0.0);
        assert!(result.valid);
        assert_eq!(result.screen.x, 400.0);
        assert_eq!(result.screen.y, 300.0);
    }
}
