//! Integration tests for Marquee Core

use marquee_core::ads::{AdError, AdEvent, AdEventType, AdInfo, AD_ACTIVE_CLASS};
use marquee_core::adapter::STREAM_ACTIVATED;
use marquee_core::headless::{
    HeadlessAdSdk, HeadlessAdsManager, HeadlessElement, HeadlessEngineFactory, HeadlessHost,
};
use marquee_core::host::MediaElement;
use marquee_core::source::{MIME_DASH, MIME_MP4};
use marquee_core::{
    AdPhase, AdsConfig, BackendEvent, BackendFamily, EventDetail, EventType, LevelId, MediaEvent, PlayerConfig,
    Session, SessionRegistry, Source, StreamingConfig,
};
use std::rc::Rc;

const TAG: &str = "https://ads.example/vast.xml";
const MOVIE: &str = "https://cdn.example/movie.mp4";
const MANIFEST: &str = "https://cdn.example/vod/manifest.mpd";

struct Player {
    element: Rc<HeadlessElement>,
    host: Rc<HeadlessHost>,
    engines: Rc<HeadlessEngineFactory>,
    sdk: Rc<HeadlessAdSdk>,
    session: Rc<Session>,
}

fn player(sources: &[Source], ads: AdsConfig, registry: &Rc<SessionRegistry>) -> Player {
    let element = Rc::new(HeadlessElement::new());
    let host = Rc::new(HeadlessHost::new());
    let engines = Rc::new(
        HeadlessEngineFactory::new().with_ladder(&[(400_000, 426, 240), (1_400_000, 854, 480), (2_800_000, 1280, 720)]),
    );
    let sdk = Rc::new(HeadlessAdSdk::new());

    let session = Session::builder(element.clone(), host.clone())
        .dash(engines.clone(), StreamingConfig::default())
        .native()
        .ads(sdk.clone(), ads)
        .registry(registry.clone())
        .build(sources)
        .unwrap();

    Player {
        element,
        host,
        engines,
        sdk,
        session,
    }
}

fn with_tag() -> AdsConfig {
    AdsConfig {
        tag_url: Some(TAG.into()),
        ..Default::default()
    }
}

fn mp4() -> Vec<Source> {
    vec![Source::new(MOVIE, MIME_MP4)]
}

// =============================================================================
// Native Playback Tests
// =============================================================================

#[test]
fn test_mp4_plays_natively() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&[Source::new("a.mp4", "video/mp4")], AdsConfig::default(), &registry);
    assert_eq!(p.session.family(), Some(BackendFamily::Native));

    p.session.load();
    p.session.play();
    p.element.run_pending();

    let types = p.element.dispatched_types();
    let play = types.iter().position(|t| t == "play").unwrap();
    let playing = types.iter().position(|t| t == "playing").unwrap();
    assert!(play < playing);
    assert!(!p.session.paused());
}

#[test]
fn test_native_error_becomes_playererror() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), AdsConfig::default(), &registry);
    p.session.load();
    p.element.run_pending();
    p.element.clear_dispatched();

    p.element.fail("MEDIA_ERR_SRC_NOT_SUPPORTED");
    p.element.run_pending();

    let dispatched = p.element.dispatched();
    let error = dispatched.iter().find(|e| e.event_type == EventType::PlayerError).unwrap();
    assert_eq!(
        error.detail,
        Some(EventDetail::Error {
            message: "MEDIA_ERR_SRC_NOT_SUPPORTED".into(),
            family: BackendFamily::Native,
        })
    );
}

#[test]
fn test_volume_and_muted_forward_to_element() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), AdsConfig::default(), &registry);

    p.session.set_volume(0.25);
    p.session.set_muted(true);
    assert_eq!(p.element.volume(), 0.25);
    assert!(p.element.muted());
    assert_eq!(p.session.volume(), 0.25);

    p.session.set_volume(3.0);
    assert_eq!(p.session.volume(), 1.0);
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[test]
fn test_dash_levels_and_auto_sentinel() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&[Source::new(MANIFEST, MIME_DASH)], AdsConfig::default(), &registry);
    p.session.load();
    p.engines.last().unwrap().emit(BackendEvent::new(STREAM_ACTIVATED));

    assert_eq!(p.element.dispatched_types(), ["loadedmetadata"]);
    let levels = p.session.levels();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[2].label, "720p");

    p.session.set_level(LevelId::Index(2));
    assert_eq!(p.session.level(), LevelId::Index(2));

    p.session.set_level("-1".parse().unwrap());
    assert_eq!(p.session.level(), LevelId::Auto);
    assert!(!p.session.levels().is_empty());
}

#[tokio::test]
async fn test_dash_ready_resolves_on_stream_activation() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&[Source::new(MANIFEST, MIME_DASH)], AdsConfig::default(), &registry);
    p.session.load();

    let ready = p.session.ready();
    assert!(!ready.is_settled());
    p.engines.last().unwrap().emit(BackendEvent::new(STREAM_ACTIVATED));
    ready.wait().await.unwrap();
}

#[test]
fn test_src_reassignment_does_not_leak_subscriptions() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&[Source::new(MANIFEST, MIME_DASH)], AdsConfig::default(), &registry);
    p.session.load();
    let baseline = p.session.subscription_count();

    for i in 0..5 {
        let src = format!("https://cdn.example/vod/{}.mpd", i);
        p.session.set_source(Source::new(src, MIME_DASH)).unwrap();
        assert_eq!(p.session.subscription_count(), baseline);
    }

    p.session.set_source(Source::new(MOVIE, MIME_MP4)).unwrap();
    p.session.set_source(Source::new(MANIFEST, MIME_DASH)).unwrap();
    assert_eq!(p.session.subscription_count(), baseline);

    assert_eq!(p.engines.created(), 7);
    assert_eq!(p.engines.last().unwrap().handler_count() + 2, baseline);
}

// =============================================================================
// Ad Overlay Tests
// =============================================================================

#[test]
fn test_ad_break_then_content() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), with_tag(), &registry);
    assert_eq!(p.session.family(), Some(BackendFamily::Ads));

    p.session.load();
    p.session.play();
    assert_eq!(p.session.ad_phase(), Some(AdPhase::Requesting));
    assert_eq!(p.sdk.display().unwrap().initialized(), 1);

    let manager = Rc::new(HeadlessAdsManager::new());
    p.sdk.loader().unwrap().load_manager(&manager);
    assert_eq!(p.session.ad_phase(), Some(AdPhase::Playing));
    assert!(p.element.has_class(AD_ACTIVE_CLASS));

    let preroll = AdInfo {
        ad_id: Some("preroll".into()),
        linear: true,
        duration: Some(10.0),
    };
    manager.emit(AdEvent::new(AdEventType::ContentPauseRequested));
    manager.emit(AdEvent::new(AdEventType::Started).with_ad(preroll.clone()));
    assert_eq!(p.host.timer_count(), 1);
    manager.emit(AdEvent::new(AdEventType::Complete).with_ad(preroll));
    manager.emit(AdEvent::new(AdEventType::ContentResumeRequested));
    manager.emit(AdEvent::new(AdEventType::AllAdsCompleted));
    p.element.run_pending();

    assert_eq!(p.element.src(), MOVIE);
    assert_eq!(p.element.play_count(), 1);
    assert!(!p.element.has_class(AD_ACTIVE_CLASS));
    assert_eq!(p.host.timer_count(), 0);
    assert!(manager.is_destroyed());

    // The finished overlay is unwrapped on the next call
    assert_eq!(p.session.family(), Some(BackendFamily::Native));
    assert_eq!(p.session.ad_phase(), None);
    assert!(p.element.overlays().is_empty());

    let types = p.element.dispatched_types();
    assert!(types.contains(&"adsstarted".to_string()));
    assert!(types.contains(&"adsmediaended".to_string()));
    assert_eq!(types.iter().filter(|t| *t == "playing").count(), 1);
}

#[test]
fn test_ad_error_before_start_plays_content_without_pause() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), with_tag(), &registry);
    p.session.load();
    p.session.play();

    p.sdk.loader().unwrap().fail(AdError::new(1009, "The VAST response document is empty"));
    p.element.run_pending();

    let types = p.element.dispatched_types();
    assert!(!types.contains(&"pause".to_string()));
    assert!(!types.contains(&"playererror".to_string()));
    assert_eq!(p.element.play_count(), 1);
    assert_eq!(p.element.src(), MOVIE);
    assert_eq!(p.session.family(), Some(BackendFamily::Native));
}

#[test]
fn test_first_pause_request_does_not_pause_content() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), with_tag(), &registry);
    p.session.load();
    let manager = Rc::new(HeadlessAdsManager::new());
    p.sdk.loader().unwrap().load_manager(&manager);

    // Non-linear ad: content resumes under the overlay
    manager.emit(AdEvent::new(AdEventType::Loaded).with_ad(AdInfo::default()));
    p.element.run_pending();
    assert!(!p.element.paused());
    p.element.clear_dispatched();

    manager.emit(AdEvent::new(AdEventType::ContentPauseRequested));
    p.element.run_pending();
    assert!(!p.element.paused());
    assert!(!p.element.dispatched_types().contains(&"pause".to_string()));
}

#[test]
fn test_ad_pause_routes_to_manager() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), with_tag(), &registry);
    p.session.load();
    let manager = Rc::new(HeadlessAdsManager::new());
    p.sdk.loader().unwrap().load_manager(&manager);

    p.session.pause();
    assert!(p.session.paused());
    assert_eq!(manager.pause_count(), 1);
    p.session.play();
    assert_eq!(manager.resume_count(), 1);
    assert_eq!(p.element.play_count(), 0);
}

#[test]
fn test_empty_tag_disables_ads() {
    let registry = Rc::new(SessionRegistry::new());
    let config = AdsConfig {
        tag_url: Some("   ".into()),
        ..Default::default()
    };
    let p = player(&mp4(), config, &registry);
    assert_eq!(p.session.family(), Some(BackendFamily::Native));
}

#[test]
fn test_destroy_during_ad_break_releases_everything() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), with_tag(), &registry);
    p.session.load();
    let manager = Rc::new(HeadlessAdsManager::new());
    p.sdk.loader().unwrap().load_manager(&manager);
    manager.emit(
        AdEvent::new(AdEventType::Started).with_ad(AdInfo {
            linear: true,
            ..Default::default()
        }),
    );

    p.session.destroy();
    assert_eq!(p.element.listener_count(), 0);
    assert_eq!(p.host.timer_count(), 0);
    assert_eq!(p.host.resize_listener_count(), 0);
    assert_eq!(manager.handler_count(), 0);
    assert!(registry.is_empty());
}

// =============================================================================
// Registry and Controls Tests
// =============================================================================

#[test]
fn test_play_pauses_other_sessions() {
    let registry = Rc::new(SessionRegistry::new());
    let first = player(&mp4(), AdsConfig::default(), &registry);
    let second = player(&mp4(), AdsConfig::default(), &registry);
    assert_eq!(registry.ids(), [first.session.id(), second.session.id()]);

    first.session.load();
    first.session.play();
    first.element.run_pending();

    second.session.load();
    second.session.play();
    second.element.run_pending();
    first.element.run_pending();

    assert!(first.element.paused());
    assert!(!second.element.paused());

    second.session.destroy();
    assert_eq!(registry.ids(), [first.session.id()]);
}

#[test]
fn test_controls_changed_echoes_playing() {
    let registry = Rc::new(SessionRegistry::new());
    let p = player(&mp4(), AdsConfig::default(), &registry);
    p.session.load();
    p.element.run_pending();

    p.element.dispatch(MediaEvent::new(EventType::ControlsChanged));
    assert!(!p.element.dispatched_types().contains(&"playing".to_string()));

    p.session.play();
    p.element.run_pending();
    p.element.clear_dispatched();
    p.element.dispatch(MediaEvent::new(EventType::ControlsChanged));
    assert_eq!(p.element.dispatched_types(), ["controlschanged", "playing"]);
}

// =============================================================================
// Config Tests
// =============================================================================

#[test]
fn test_player_config_from_json() {
    let config = PlayerConfig::from_json(
        r#"{
            "ads": { "tag_url": "https://ads.example/vmap.xml" },
            "streaming": { "overrides": { "streaming": { "lowLatencyEnabled": true } } }
        }"#,
    )
    .unwrap();

    assert_eq!(config.ads.active_tag(), Some("https://ads.example/vmap.xml"));
    assert_eq!(config.ads.non_linear_height, 150);
    let settings = config.streaming.settings();
    assert_eq!(settings["streaming"]["lowLatencyEnabled"], true);
    assert!(settings["streaming"].get("abr").is_none());
}

#[test]
fn test_invalid_tag_rejected() {
    assert!(PlayerConfig::from_json(r#"{ "ads": { "tag_url": "not a url" } }"#).is_err());
}
