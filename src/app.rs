//! Outermost scope of the program: connection check and interrupt handling
//!
//! The controller session is raced against a [`CancellationToken`]. When the
//! token fires the session future is dropped where it stands, so no further
//! reads or calibrations happen, and a single shutdown report is emitted.

use crate::controller::{CalibrationController, ControllerError, Disconnected, Report};
use std::future::Future;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped by the shutdown token
    Interrupted,
    /// The sensor did not answer at startup
    NotConnected,
}

impl RunOutcome {
    /// Process exit status: 0 after an interrupt, 1 when the sensor was missing
    pub fn exit_status(self) -> u8 {
        match self {
            RunOutcome::Interrupted => 0,
            RunOutcome::NotConnected => 1,
        }
    }
}

impl From<RunOutcome> for ExitCode {
    fn from(outcome: RunOutcome) -> Self {
        ExitCode::from(outcome.exit_status())
    }
}

/// Spawns a task that cancels `shutdown` once `signal` resolves.
///
/// Yields once before returning so the signal future has been polled, and its
/// handler installed, before the caller carries on with blocking startup work.
pub async fn watch_for_shutdown<F>(signal: F, shutdown: CancellationToken) -> JoinHandle<()>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let watcher = tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("Interrupt received");
                shutdown.cancel();
            }
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });
    tokio::task::yield_now().await;
    watcher
}

/// Connects the sensor and runs the calibration loop until `shutdown` is cancelled.
///
/// Sensor and channel failures during the loop are returned as errors.
pub async fn run(
    controller: CalibrationController<Disconnected>,
    reports: mpsc::Sender<Report>,
    shutdown: CancellationToken,
) -> Result<RunOutcome, ControllerError> {
    emit(&reports, Report::Banner).await?;

    if shutdown.is_cancelled() {
        info!("Shutdown requested during startup");
        emit(&reports, Report::Shutdown).await?;
        return Ok(RunOutcome::Interrupted);
    }

    let initialized = match controller.connect() {
        Ok(initialized) => initialized,
        Err(ControllerError::NotConnected) => {
            error!("No magnetometer connected, giving up");
            emit(&reports, Report::NotConnected).await?;
            return Ok(RunOutcome::NotConnected);
        }
        Err(e) => return Err(e),
    };

    info!("Sensor ready, loop settings: {:?}", initialized.settings());
    let session = async move { initialized.start().await?.run_forever().await };

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Shutdown requested, leaving calibration loop");
            emit(&reports, Report::Shutdown).await?;
            Ok(RunOutcome::Interrupted)
        }
        result = session => match result {
            Ok(never) => match never {},
            Err(e) => {
                error!("Calibration loop failed: {}", e);
                Err(e)
            }
        },
    }
}

async fn emit(reports: &mpsc::Sender<Report>, report: Report) -> Result<(), ControllerError> {
    reports
        .send(report)
        .await
        .map_err(|e| ControllerError::ChannelError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration_controller::tests::FakeMagnetometer;
    use crate::controller::clock::tests::SimulatedClock;
    use crate::controller::ControllerSettings;
    use crate::sensor::{Magnetometer, Measurement, OffsetVector, SensorError};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    fn setup(
        driver: Box<dyn Magnetometer>,
    ) -> (
        CalibrationController<Disconnected>,
        mpsc::Sender<Report>,
        mpsc::Receiver<Report>,
    ) {
        let (sender, receiver) = mpsc::channel(4096);
        let controller = CalibrationController::create(
            driver,
            Arc::new(SimulatedClock::new()),
            ControllerSettings::default(),
            sender.clone(),
        );
        (controller, sender, receiver)
    }

    async fn collect(mut receiver: mpsc::Receiver<Report>) -> Vec<Report> {
        let mut reports = Vec::new();
        while let Some(report) = receiver.recv().await {
            reports.push(report);
        }
        reports
    }

    #[tokio::test]
    async fn absent_sensor_reports_once_and_stops() {
        let fake = FakeMagnetometer::new(false);
        let stats = fake.stats.clone();
        let (controller, sender, receiver) = setup(Box::new(fake));

        let outcome = run(controller, sender, CancellationToken::new()).await;

        assert_eq!(outcome.unwrap(), RunOutcome::NotConnected);
        assert_eq!(
            collect(receiver).await,
            vec![Report::Banner, Report::NotConnected]
        );
        assert_eq!(stats.reads(), 0);
        assert_eq!(stats.calibrations(), 0);
    }

    #[tokio::test]
    async fn interrupt_during_sampling_shuts_down_once() {
        let fake = FakeMagnetometer::new(true);
        let stats = fake.stats.clone();
        let (controller, sender, receiver) = setup(Box::new(fake));
        let shutdown = CancellationToken::new();

        let trigger = shutdown.clone();
        let watched = stats.clone();
        tokio::spawn(async move {
            while watched.reads() < 5 {
                tokio::task::yield_now().await;
            }
            trigger.cancel();
        });

        let outcome = run(controller, sender, shutdown).await;
        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);

        let reads_at_shutdown = stats.reads();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(stats.reads(), reads_at_shutdown);
        assert_eq!(stats.calibrations(), 0);

        let reports = collect(receiver).await;
        let shutdowns = reports
            .iter()
            .filter(|r| matches!(r, Report::Shutdown))
            .count();
        assert_eq!(shutdowns, 1);
        assert_eq!(reports.last(), Some(&Report::Shutdown));
        assert_eq!(reports.first(), Some(&Report::Banner));
        assert!(matches!(reports.get(1), Some(Report::Ready { .. })));
    }

    #[tokio::test]
    async fn interrupt_before_first_sample_still_shuts_down_cleanly() {
        let fake = FakeMagnetometer::new(true);
        let stats = fake.stats.clone();
        let (controller, sender, receiver) = setup(Box::new(fake));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let outcome = run(controller, sender, shutdown).await;

        assert_eq!(outcome.unwrap(), RunOutcome::Interrupted);
        assert_eq!(stats.reads(), 0);
        assert_eq!(stats.calibrations(), 0);
        assert_eq!(
            collect(receiver).await,
            vec![Report::Banner, Report::Shutdown]
        );
    }

    #[test]
    fn outcome_maps_to_exit_code() {
        assert_eq!(RunOutcome::Interrupted.exit_status(), 0);
        assert_eq!(RunOutcome::NotConnected.exit_status(), 1);
        assert_eq!(
            format!("{:?}", ExitCode::from(RunOutcome::Interrupted)),
            format!("{:?}", ExitCode::SUCCESS)
        );
        assert_eq!(
            format!("{:?}", ExitCode::from(RunOutcome::NotConnected)),
            format!("{:?}", ExitCode::FAILURE)
        );
    }

    #[tokio::test]
    async fn signal_is_armed_before_startup_continues() {
        let armed = Arc::new(AtomicBool::new(false));
        let (fire, fired) = oneshot::channel::<()>();
        let shutdown = CancellationToken::new();

        let flag = armed.clone();
        let watcher = watch_for_shutdown(
            async move {
                flag.store(true, Ordering::SeqCst);
                let _ = fired.await;
                Ok(())
            },
            shutdown.clone(),
        )
        .await;

        assert!(armed.load(Ordering::SeqCst));
        assert!(!shutdown.is_cancelled());

        fire.send(()).unwrap();
        watcher.await.unwrap();
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn failed_signal_listener_leaves_token_alone() {
        let shutdown = CancellationToken::new();

        let watcher = watch_for_shutdown(
            async { Err(std::io::Error::other("no signal driver")) },
            shutdown.clone(),
        )
        .await;
        watcher.await.unwrap();

        assert!(!shutdown.is_cancelled());
    }

    struct FailingMagnetometer;

    impl Magnetometer for FailingMagnetometer {
        fn is_connected(&mut self) -> bool {
            true
        }

        fn initialize(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn read_measurement(&mut self) -> Result<Measurement, SensorError> {
            Err(SensorError::Bus("bus lost arbitration".to_string()))
        }

        fn calibrate_offsets(&mut self) -> Result<(), SensorError> {
            Ok(())
        }

        fn offsets(&self) -> OffsetVector {
            OffsetVector::default()
        }
    }

    #[tokio::test]
    async fn bus_failure_during_loop_is_fatal() {
        let (controller, sender, _receiver) = setup(Box::new(FailingMagnetometer));

        let outcome = run(controller, sender, CancellationToken::new()).await;

        assert!(matches!(
            outcome,
            Err(ControllerError::SensorError(SensorError::Bus(_)))
        ));
    }
}
