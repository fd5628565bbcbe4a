use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use heatloop_common::{
    decide, ControlError, ControllerConfig, CycleRecord, DayNightSchedule, PresenceEdge,
    PresenceStatus, PresenceTracker, PresenceUpdate, RelayCommand, SchedulePeriod,
};

use crate::ports::{ActuatorClient, Clock, SensorClient, TelemetrySink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Schedule(SchedulePeriod),
    Away,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Schedule(period) => period.as_str(),
            Self::Away => "away",
        }
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// No command was issued: a reading failed or the relay rejected it.
    Aborted(ControlError),
    Held {
        period: SchedulePeriod,
        temp_f: f32,
    },
    Commanded {
        command: RelayCommand,
        trigger: Trigger,
    },
}

struct PresencePlan {
    sensor_ids: Vec<String>,
    check_interval: Duration,
    checks_per_cycle: u64,
    tracker: PresenceTracker,
}

/// Outer/inner cadence driver. Runs sequentially on one task; the presence
/// tracker is owned here and nothing else mutates it.
pub struct ControlLoop<S, A, T, C> {
    schedule: DayNightSchedule,
    poll_interval: Duration,
    presence: Option<PresencePlan>,
    sensor: S,
    actuator: A,
    telemetry: T,
    clock: C,
}

impl<S, A, T, C> ControlLoop<S, A, T, C>
where
    S: SensorClient,
    A: ActuatorClient,
    T: TelemetrySink,
    C: Clock,
{
    pub fn new(config: &ControllerConfig, sensor: S, actuator: A, telemetry: T, clock: C) -> Self {
        let presence = config.presence.as_ref().map(|presence| PresencePlan {
            sensor_ids: presence.motion_sensor_ids.clone(),
            check_interval: presence.check_interval(),
            checks_per_cycle: presence.checks_per_cycle(config.poll_interval_secs),
            tracker: PresenceTracker::new(Instant::now().into_std(), presence.timeout()),
        });

        Self {
            schedule: config.schedule,
            poll_interval: config.poll_interval(),
            presence,
            sensor,
            actuator,
            telemetry,
            clock,
        }
    }

    #[cfg(test)]
    pub fn presence_status(&self) -> Option<PresenceStatus> {
        self.presence.as_ref().map(|plan| plan.tracker.status())
    }

    pub fn presence_checks_per_cycle(&self) -> Option<u64> {
        self.presence.as_ref().map(|plan| plan.checks_per_cycle)
    }

    pub async fn run(&mut self) {
        loop {
            match self.run_cycle().await {
                CycleOutcome::Aborted(err) => debug!(kind = err.kind(), "cycle aborted"),
                CycleOutcome::Held { period, temp_f } => {
                    debug!(period = period.as_str(), temp_f, "cycle held")
                }
                CycleOutcome::Commanded { command, trigger } => debug!(
                    command = command.as_str(),
                    trigger = trigger.as_str(),
                    "cycle commanded"
                ),
            }

            // The presence burst is the cycle's wait; without it, sleep the
            // full outer interval.
            if self.presence.is_none() {
                sleep(self.poll_interval).await;
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let measured = self.measure().await;
        if let Ok(record) = &measured {
            self.emit(record).await;
        }

        let presence = match self.presence.as_mut() {
            Some(plan) => Some(sample_presence(plan, &self.sensor).await),
            None => None,
        };

        let record = match measured {
            Ok(record) => record,
            Err(err) => {
                warn!(error = %err, kind = err.kind(), "cycle reading failed, skipping decision");
                return CycleOutcome::Aborted(err);
            }
        };

        if let Some(update) = presence {
            if update.status == PresenceStatus::Away {
                info!(
                    decision = "FORCE_OFF",
                    presence = update.status.as_str(),
                    idle_secs = update.idle.as_secs(),
                    temp_f = record.temperature_f,
                    "nobody home, heater off"
                );
                return self.actuate(RelayCommand::Off, Trigger::Away).await;
            }
        }

        self.apply_policy(record.temperature_f).await
    }

    async fn measure(&self) -> Result<CycleRecord, ControlError> {
        let reading = self.sensor.read_ambient().await?;
        let power_watts = self.actuator.read_power_watts().await?;
        let record = CycleRecord::new(reading, power_watts);
        debug!(
            temp_f = record.temperature_f,
            humidity = record.relative_humidity,
            power_watts = record.power_watts,
            "cycle reading"
        );
        Ok(record)
    }

    async fn emit(&self, record: &CycleRecord) {
        if let Err(err) = self.telemetry.write(record).await {
            warn!(error = %err, "telemetry write failed");
        }
    }

    async fn apply_policy(&self, temp_f: f32) -> CycleOutcome {
        let (period, thresholds) = self.schedule.select(self.clock.time_of_day());
        let decision = decide(temp_f, &thresholds);

        info!(
            period = period.as_str(),
            decision = decision.as_str(),
            temp_f,
            low_f = thresholds.low_f,
            high_f = thresholds.high_f,
            "policy decision"
        );

        match decision.command() {
            Some(command) => self.actuate(command, Trigger::Schedule(period)).await,
            None => CycleOutcome::Held { period, temp_f },
        }
    }

    async fn actuate(&self, command: RelayCommand, trigger: Trigger) -> CycleOutcome {
        match self.actuator.apply(command).await {
            Ok(()) => CycleOutcome::Commanded { command, trigger },
            Err(err) => {
                warn!(error = %err, command = command.as_str(), "relay command failed");
                CycleOutcome::Aborted(err)
            }
        }
    }
}

async fn sample_presence<S: SensorClient>(plan: &mut PresencePlan, sensor: &S) -> PresenceUpdate {
    for sample in 0..plan.checks_per_cycle {
        let detected = any_motion(sensor, &plan.sensor_ids).await;
        plan.tracker.observe_motion(detected, Instant::now().into_std());
        debug!(sample, detected, "presence sample");
        sleep(plan.check_interval).await;
    }

    let update = plan.tracker.evaluate(Instant::now().into_std());
    match update.edge {
        Some(PresenceEdge::Left) => info!(
            presence = update.status.as_str(),
            idle_secs = update.idle.as_secs(),
            "presence timeout elapsed"
        ),
        Some(PresenceEdge::Returned) => info!(
            presence = update.status.as_str(),
            idle_secs = update.idle.as_secs(),
            "motion detected again"
        ),
        None => {}
    }
    update
}

/// Reads every sensor; a failed read counts as no motion.
async fn any_motion<S: SensorClient>(sensor: &S, sensor_ids: &[String]) -> bool {
    let mut detected = false;
    for id in sensor_ids {
        match sensor.read_motion(id).await {
            Ok(motion) => detected |= motion,
            Err(err) => warn!(sensor = %id, error = %err, "motion read failed"),
        }
    }
    detected
}
