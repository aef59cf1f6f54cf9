use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use herald::audio::capture::CaptureStream;
use herald::config::CoordinatorConfig;
use herald::kernel::coordinator::{Coordinator, SideEffect};
use herald::kernel::event::Event;
use herald::kernel::time::{Clock, LEVEL_POLL_MS, POLL_MS};
use herald::outputs::sink::{AudioDecoder, CpalSink, PlaybackSink, WavDecoder};
use herald::services::archive::{ArchiveSink, HttpArchiveSink};
use herald::services::paging::client::HttpDeviceControl;
use herald::services::paging::orchestrator::PagingOrchestrator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    tracing::info!("Herald Coordinator Booting...");

    let config = match std::env::args().nth(1) {
        Some(path) => CoordinatorConfig::from_file(&path)?,
        None => CoordinatorConfig::default(),
    };

    // Kernel Channel
    let (tx, rx) = mpsc::channel(256);

    let capture = CaptureStream::new(tx.clone())?;
    let mut coordinator = Coordinator::new(rx, config.clone());
    coordinator.start(capture.sample_rate, capture.channels);

    let orchestrator = PagingOrchestrator::new(
        HttpDeviceControl::new(&config.paging_device.host),
        config.clone(),
    );
    let archive_sink = HttpArchiveSink::new(&config.paging_device.host);
    let decoder = WavDecoder;
    let mut sink = CpalSink::new()?;

    let clock = Clock::start();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel.cancel();
        });
    }

    // 50ms cadence for output metering; the kernel steps every 100ms.
    let mut cadence = tokio::time::interval(std::time::Duration::from_millis(LEVEL_POLL_MS));
    cadence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let steps_per_kernel_tick = (POLL_MS / LEVEL_POLL_MS).max(1);
    let mut meter_ticks: u64 = 0;

    tracing::info!("Herald Coordinator Active. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = cadence.tick() => {}
            _ = cancel.cancelled() => break,
        }

        tracing::trace!(level = sink.output_level(), "output meter");
        meter_ticks += 1;
        if meter_ticks % steps_per_kernel_tick != 0 {
            continue;
        }

        // Drain Kernel Events
        let mut events = Vec::new();
        while let Ok(event) = coordinator.receiver.try_recv() {
            events.push(event);
        }

        let now_ms = clock.now_ms();
        let effects = coordinator.tick_step(events, now_ms);

        for effect in effects {
            execute_effect(effect, now_ms, &tx, &orchestrator, &archive_sink, &decoder, &mut sink);
        }
    }

    // Teardown: stop capture, tear hardware down synchronously.
    let effects = coordinator.abort();
    for effect in effects {
        if let SideEffect::Deactivate { .. } = effect {
            orchestrator.deactivate().await;
        }
    }
    drop(capture);
    tracing::info!("Herald Coordinator stopped.");
    Ok(())
}

fn execute_effect(
    effect: SideEffect,
    now_ms: u64,
    tx: &mpsc::Sender<Event>,
    orchestrator: &PagingOrchestrator<HttpDeviceControl>,
    archive_sink: &HttpArchiveSink,
    decoder: &WavDecoder,
    sink: &mut CpalSink,
) {
    match effect {
        SideEffect::Activate {
            session_id,
            generation: _,
        } => {
            let orch = orchestrator.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = orch.activate().await.map_err(|e| e.to_string());
                let _ = tx.send(Event::Activated { session_id, outcome }).await;
            });
        }
        SideEffect::Deactivate { session_id } => {
            let orch = orchestrator.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                orch.deactivate().await;
                let _ = tx.send(Event::Deactivated { session_id }).await;
            });
        }
        SideEffect::Decode {
            generation,
            batch_id,
            archive,
        } => {
            let decoder = *decoder;
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = decoder.decode(&archive).await;
                let _ = tx
                    .send(Event::Decoded {
                        generation,
                        batch_id,
                        outcome,
                    })
                    .await;
            });
        }
        SideEffect::Play {
            batch_id,
            audio,
            start_ms,
        } => {
            // The sink pads any gap with silence so the scheduled start
            // time is what the speaker actually does.
            tracing::debug!(%batch_id, start_ms, "pushing batch to output");
            sink.play(&audio, start_ms, now_ms);
        }
        SideEffect::SetGain(gain) => sink.set_gain(gain),
        SideEffect::Upload {
            archive_seq,
            bytes,
            mime,
        } => {
            let archive_sink = archive_sink.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = archive_sink
                    .upload(&bytes, &mime)
                    .await
                    .map_err(|e| e.to_string());
                let _ = tx
                    .send(Event::Uploaded {
                        archive_seq,
                        outcome,
                    })
                    .await;
            });
        }
    }
}
