pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Booked,
    Rescheduled,
    Cancelled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Booked => "booked",
            EventKind::Rescheduled => "rescheduled",
            EventKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentEvent {
    pub kind: EventKind,
    pub appointment_id: String,
    pub subject_id: i64,
    pub provider_name: String,
    pub date: NaiveDate,
    /// Display form, e.g. `3:00 PM`.
    pub time: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
        tracing::info!(
            kind = event.kind.as_str(),
            appointment_id = %event.appointment_id,
            provider = %event.provider_name,
            date = %event.date,
            time = %event.time,
            "appointment event"
        );
        Ok(())
    }
}

// Outside a runtime the event is dropped.
pub fn dispatch(notifier: &Arc<dyn Notifier>, event: AppointmentEvent) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!(kind = event.kind.as_str(), "no runtime, skipping notification");
        return;
    };
    let notifier = Arc::clone(notifier);
    handle.spawn(async move {
        if let Err(e) = notifier.notify(&event).await {
            tracing::warn!(
                appointment_id = %event.appointment_id,
                "failed to deliver notification: {e:#}"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, event: &AppointmentEvent) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    fn event(kind: EventKind) -> AppointmentEvent {
        AppointmentEvent {
            kind,
            appointment_id: "a-1".to_string(),
            subject_id: 1,
            provider_name: "Dr. Lee".to_string(),
            date: NaiveDate::from_ymd_opt(2030, 1, 2).unwrap(),
            time: "3:00 PM".to_string(),
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        let notifier: Arc<dyn Notifier> = recording.clone();
        dispatch(&notifier, event(EventKind::Cancelled));

        for _ in 0..50 {
            if !recording.0.lock().unwrap().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*recording.0.lock().unwrap(), vec![EventKind::Cancelled]);
    }

    #[test]
    fn test_dispatch_without_runtime_is_noop() {
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        dispatch(&notifier, event(EventKind::Booked));
    }
}
