//! End-to-end lap pipeline scenarios over in-memory sources.

use anyhow::{Context, Result, ensure};
use garage::config::PipelineConfig;
use garage::laps::{InvalidReason, LapTimeSource};
use garage::{ChannelId, ChannelTable, GarageError, LapPipeline, LapTime, MemorySource, SessionType};
use proptest::prelude::*;

const SESSION_YAML: &str = "\
WeekendInfo:
 TrackName: limerock 2008
 TrackDisplayName: Lime Rock Park
 TrackConfigName: 2008
 TrackLength: 2.44 km
 TrackWeatherType: Static
 TrackSkies: Partly Cloudy
 TrackSurfaceTemp: 33.15 C
 TrackAirTemp: 24.32 C
SessionInfo:
 Sessions:
 - SessionNum: 0
   SessionType: Lone Qualify
DriverInfo:
 DriverCarIdx: 0
 DriverSetupName: baseline.sto
 Drivers:
 - CarIdx: 0
   UserName: Ana Ruiz
   CarScreenName: Global Mazda MX-5 Cup
   CarClassShortName: MX5 Cup
";

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    (0..n).map(|i| start + (end - start) * i as f64 / (n - 1) as f64).collect()
}

fn source(columns: Vec<(ChannelId, Vec<f64>)>) -> Result<MemorySource> {
    let table = ChannelTable::from_columns(columns)?;
    Ok(MemorySource::new(Some(SESSION_YAML.to_string()), table).with_path("/uploads/scenario.ibt"))
}

#[test]
fn two_laps_from_lap_index_and_session_time() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();
    let mut lap = vec![0.0; 50];
    lap.extend(vec![1.0; 100]);
    lap.extend(vec![2.0; 150]);
    let source = source(vec![
        (ChannelId::Lap, lap),
        (ChannelId::SessionTime, linspace(0.0, 30.0, 300)),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    assert_eq!(session.laps.len(), 2);

    let lap1 = &session.laps[0];
    assert_eq!(lap1.lap_number(), 1);
    assert_eq!(lap1.segment.sample_range(), 50..150);
    assert!((lap1.lap_time().as_secs_f64() - 10.0).abs() < 0.1, "lap 1 took {}", lap1.lap_time());
    assert_eq!(lap1.segment.time_source, LapTimeSource::SessionTime);

    let lap2 = &session.laps[1];
    assert_eq!(lap2.lap_number(), 2);
    assert_eq!(lap2.segment.sample_range(), 150..300);
    assert!((lap2.lap_time().as_secs_f64() - 15.0).abs() < 0.1, "lap 2 took {}", lap2.lap_time());
    Ok(())
}

#[test]
fn session_context_from_metadata() -> Result<()> {
    let source = source(vec![(ChannelId::Lap, vec![1.0; 10])])?;
    let context = LapPipeline::default().process_source(&source)?.context;

    assert_eq!(context.track_name.as_deref(), Some("Lime Rock Park"));
    assert_eq!(context.track_config.as_deref(), Some("2008"));
    assert_eq!(context.track_length_km, Some(2.44));
    assert_eq!(context.car_name.as_deref(), Some("Global Mazda MX-5 Cup"));
    assert_eq!(context.driver_name.as_deref(), Some("Ana Ruiz"));
    assert_eq!(context.session_type, Some(SessionType::Qualifying));
    assert_eq!(context.air_temp_c, Some(24.32));
    assert_eq!(context.track_temp_c, Some(33.15));
    assert_eq!(garage::metadata::extract_context(&source)?, context);
    Ok(())
}

#[test]
fn off_track_samples_invalidate_the_lap() -> Result<()> {
    let mut surface = vec![1.0; 100];
    surface[80..=89].fill(3.0);
    let source = source(vec![
        (ChannelId::Lap, vec![1.0; 100]),
        (ChannelId::SessionTime, linspace(0.0, 60.0, 100)),
        (ChannelId::PlayerTrackSurface, surface),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let lap = session.laps.first().context("one lap")?;
    assert!(!lap.is_valid());
    assert_eq!(lap.validity.reasons, vec![InvalidReason::OffTrack { samples: 10 }]);
    Ok(())
}

#[test]
fn short_lap_is_invalid_whatever_the_channels_say() -> Result<()> {
    let source = source(vec![
        (ChannelId::Lap, vec![1.0; 60]),
        (ChannelId::SessionTime, linspace(100.0, 105.123, 60)),
        (ChannelId::PlayerTrackSurface, vec![1.0; 60]),
        (ChannelId::OnPitRoad, vec![0.0; 60]),
        (ChannelId::PlayerCarMyIncidentCount, vec![0.0; 60]),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let lap = &session.laps[0];
    assert_eq!(lap.lap_time(), LapTime::from_secs_f64(5.123).context("lap time")?);
    assert!(!lap.is_valid());
    assert!(matches!(lap.validity.reasons[..], [InvalidReason::Incomplete { .. }]));
    Ok(())
}

#[test]
fn every_rule_reports_independently() -> Result<()> {
    let mut surface = vec![1.0; 100];
    surface[10] = 3.0;
    surface[11] = -1.0;
    let mut incidents = vec![2.0; 100];
    incidents[99] = 6.0;
    let mut pit = vec![0.0; 100];
    pit[99] = 1.0;
    let source = source(vec![
        (ChannelId::Lap, vec![1.0; 100]),
        (ChannelId::SessionTime, linspace(0.0, 4.0, 100)),
        (ChannelId::PlayerTrackSurface, surface),
        (ChannelId::PlayerCarMyIncidentCount, incidents),
        (ChannelId::OnPitRoad, pit),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let reasons = &session.laps[0].validity.reasons;
    assert_eq!(reasons.len(), 5, "{:?}", reasons);
    assert!(matches!(reasons[0], InvalidReason::Incomplete { .. }));
    assert!(reasons.contains(&InvalidReason::OffTrack { samples: 1 }));
    assert!(reasons.contains(&InvalidReason::NotInWorld { samples: 1 }));
    assert!(reasons.contains(&InvalidReason::Incident { count: 4.0 }));
    assert!(reasons.contains(&InvalidReason::Inlap));
    Ok(())
}

#[test]
fn missing_validation_channels_fail_open() -> Result<()> {
    let source = source(vec![
        (ChannelId::Lap, vec![1.0; 100]),
        (ChannelId::SessionTime, linspace(0.0, 80.0, 100)),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let lap = &session.laps[0];
    ensure!(lap.is_valid(), "lap should pass with no evidence against it");
    assert!(lap.validity.unevaluated.contains(&ChannelId::PlayerTrackSurface));
    assert!(lap.validity.unevaluated.contains(&ChannelId::OnPitRoad));
    assert!(lap.validity.unevaluated.contains(&ChannelId::PlayerCarMyIncidentCount));
    assert_eq!(lap.stats.max_speed_kph, None);
    Ok(())
}

#[test]
fn missing_lap_channel_yields_fallback_lap() -> Result<()> {
    let source = source(vec![(ChannelId::Speed, vec![30.0; 40])])?;

    let session = LapPipeline::default().process_source(&source)?;
    assert_eq!(session.laps.len(), 1);
    let lap = &session.laps[0];
    assert!(lap.segment.is_fallback);
    assert_eq!(lap.lap_number(), 1);
    assert_eq!(lap.lap_time(), LapTime::ZERO);
    // Fallback laps are not validated unless configured to be.
    assert!(lap.is_valid());
    assert_eq!(lap.stats.max_speed_kph, Some(108.0));

    let mut config = PipelineConfig::default();
    config.validation.validate_fallback_lap = true;
    let session = LapPipeline::new(config)?.process_source(&source)?;
    assert!(!session.laps[0].is_valid());
    Ok(())
}

#[test]
fn fallback_lap_is_timed_by_session_time() -> Result<()> {
    let source = source(vec![
        (ChannelId::Speed, vec![30.0; 600]),
        (ChannelId::SessionTime, linspace(0.0, 9.98, 600)),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let lap = session.laps.first().context("fallback lap")?;
    assert!(lap.segment.is_fallback);
    assert_eq!(lap.segment.time_source, LapTimeSource::SessionTime);
    assert_eq!(lap.lap_time(), LapTime::from_secs_f64(9.98).context("lap time")?);
    Ok(())
}

#[test]
fn recording_without_samples_has_no_laps() -> Result<()> {
    let source = MemorySource::new(Some(SESSION_YAML.to_string()), ChannelTable::new());
    let session = LapPipeline::default().process_source(&source)?;
    assert!(session.laps.is_empty());
    assert_eq!(session.skipped_laps, 0);
    assert_eq!(session.context.track_name.as_deref(), Some("Lime Rock Park"));
    Ok(())
}

#[test]
fn malformed_laps_are_skipped_and_counted() -> Result<()> {
    let lap = vec![1.0, 1.0, 1.5, 1.5, 2.0, 2.0, 3.0, 2.0, 4.0, 4.0];
    let source = source(vec![
        (ChannelId::SessionTime, linspace(0.0, 9.0, lap.len())),
        (ChannelId::Lap, lap),
    ])?;

    let session = LapPipeline::default().process_source(&source)?;
    let numbers: Vec<u32> = session.laps.iter().map(|l| l.lap_number()).collect();
    assert_eq!(numbers, vec![1, 3, 4]);
    assert_eq!(session.skipped_laps, 2);
    Ok(())
}

#[test]
fn missing_metadata_is_fatal() -> Result<()> {
    let table = ChannelTable::from_columns([(ChannelId::Lap, vec![1.0; 10])])?;
    let error = LapPipeline::default()
        .process_source(&MemorySource::new(None, table))
        .unwrap_err();
    assert!(matches!(error, GarageError::MetadataMissing { .. }));
    assert!(error.is_fatal());
    Ok(())
}

#[test]
fn config_round_trips_through_yaml() -> Result<()> {
    let config = PipelineConfig::from_yaml_str(
        "validation:\n  min_lap_time_secs: 20.0\n  check_inlap: false\n",
    )?;
    assert_eq!(config.validation.min_lap_time_secs, 20.0);
    assert!(!config.validation.check_inlap);
    assert!(config.validation.check_incidents);

    let source = source(vec![
        (ChannelId::Lap, vec![1.0; 100]),
        (ChannelId::SessionTime, linspace(0.0, 15.0, 100)),
    ])?;
    let session = LapPipeline::new(config.clone())?.process_source(&source)?;
    assert!(!session.laps[0].is_valid());

    let reparsed = PipelineConfig::from_yaml_str(&config.to_yaml_string()?)?;
    assert_eq!(reparsed.validation.min_lap_time_secs, 20.0);
    Ok(())
}

proptest! {
    #[test]
    fn prop_laps_partition_non_zero_samples(runs in prop::collection::vec(1usize..40, 1..8)) {
        // Lap 0 first, then laps 1..n, each `runs[i]` samples long.
        let lap: Vec<f64> = runs
            .iter()
            .enumerate()
            .flat_map(|(n, len)| std::iter::repeat_n(n as f64, *len))
            .collect();
        let total = lap.len();
        let source = source(vec![
            (ChannelId::SessionTime, (0..total).map(|i| i as f64 / 60.0).collect()),
            (ChannelId::Lap, lap),
        ]).unwrap();

        let session = LapPipeline::default().process_source(&source).unwrap();
        prop_assert_eq!(session.laps.len(), runs.len() - 1);
        prop_assert_eq!(session.skipped_laps, 0);

        let mut expected_start = runs[0];
        for (lap, len) in session.laps.iter().zip(&runs[1..]) {
            prop_assert!(lap.lap_number() != 0);
            prop_assert_eq!(lap.segment.start, expected_start);
            prop_assert_eq!(lap.segment.sample_count(), *len);
            expected_start += len;
        }
        prop_assert_eq!(expected_start, total);
    }
}
