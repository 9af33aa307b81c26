//! Live lap tracking over an async sample feed.

use futures::StreamExt;
use garage::live::{LiveLapExt, LiveLapTracker, TelemetrySample};
use garage::{ChannelId, LapPipeline, PipelineConfig, ProcessedLap, SessionContext};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

fn sample(lap: u32, tick: usize) -> TelemetrySample {
    [
        (ChannelId::Lap, lap as f64),
        (ChannelId::SessionTime, tick as f64 / 60.0),
        (ChannelId::LapDistPct, (tick % 1200) as f64 / 1200.0),
        (ChannelId::Speed, 40.0 + (tick % 10) as f64),
        (ChannelId::PlayerTrackSurface, 1.0),
        (ChannelId::OnPitRoad, 0.0),
        (ChannelId::PlayerCarMyIncidentCount, 0.0),
    ]
    .into_iter()
    .collect()
}

#[tokio::test]
async fn laps_complete_as_samples_arrive() {
    let _ = tracing_subscriber::fmt::try_init();
    let (tx, rx) = mpsc::channel(256);

    let producer = tokio::spawn(async move {
        // Out-lap then three 20 second laps at 60 Hz.
        for tick in 0..4800 {
            let lap = (tick / 1200) as u32;
            if tx.send(sample(lap, tick)).await.is_err() {
                break;
            }
        }
    });

    let context = SessionContext { sector_starts: vec![0.0, 0.333333, 0.666667], ..Default::default() };
    let tracker = LiveLapTracker::new(LapPipeline::default()).with_context(&context);
    let laps: Vec<ProcessedLap> = ReceiverStream::new(rx).completed_laps(tracker).collect().await;
    producer.await.unwrap();

    let numbers: Vec<u32> = laps.iter().map(ProcessedLap::lap_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    for lap in &laps {
        assert!(lap.is_valid(), "lap {} invalid: {:?}", lap.lap_number(), lap.validity);
        assert!((lap.lap_time().as_secs_f64() - 1199.0 / 60.0).abs() < 1e-3);
        assert_eq!(lap.stats.max_speed_kph, Some(176.4));
        let sectors = lap.stats.sector_times.expect("three sectors");
        assert!((sectors.sector1.as_secs_f64() - 6.667).abs() < 0.05);
    }
}

#[tokio::test]
async fn live_laps_follow_the_configured_rules() {
    let mut config = PipelineConfig::default();
    config.validation.min_lap_time_secs = 30.0;
    let tracker = LiveLapTracker::new(LapPipeline::new(config).unwrap());

    let samples: Vec<TelemetrySample> = (0..1200).map(|tick| sample(5, tick)).collect();
    let laps: Vec<ProcessedLap> =
        tokio_stream::iter(samples).completed_laps(tracker).collect().await;

    assert_eq!(laps.len(), 1);
    assert_eq!(laps[0].lap_number(), 5);
    assert!(!laps[0].is_valid());
}
