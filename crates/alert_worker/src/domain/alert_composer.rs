use chrono::SecondsFormat;
use common::domain::{AlertEvent, MailMessage, MonitoredField, RainStatus, WebhookMessage};
use serde_json::{json, Value};
use std::fmt::Write;

const RAIN_COLOR: u32 = 0x3498db;
const DRY_COLOR: u32 = 0xf1c40f;

fn transition(event: &AlertEvent, field: MonitoredField) -> String {
    format!(
        "{} → {}",
        field.value_on(&event.previous),
        field.value_on(&event.current)
    )
}

fn optional(value: Option<f64>, unit: &str) -> String {
    value
        .map(|v| format!("{:.1}{}", v, unit))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Renders alert events into mail and webhook notifications
#[derive(Debug, Clone, Default)]
pub struct AlertComposer {
    /// Human readable device name used instead of the id when present
    pub device_label: Option<String>,
}

impl AlertComposer {
    fn label<'a>(&'a self, event: &'a AlertEvent) -> &'a str {
        self.device_label.as_deref().unwrap_or(&event.device_id)
    }

    pub fn subject(&self, event: &AlertEvent) -> String {
        let changes: Vec<String> = event
            .changed_fields
            .iter()
            .map(|field| format!("{} {}", field, transition(event, *field)))
            .collect();

        format!("[Rainguard] {}: {}", self.label(event), changes.join(", "))
    }

    pub fn mail_body(&self, event: &AlertEvent) -> String {
        let current = &event.current;
        let mut body = String::new();

        let _ = writeln!(
            body,
            "Device {} changed state in automatic mode.",
            self.label(event)
        );
        let _ = writeln!(body);
        for field in &event.changed_fields {
            let _ = writeln!(body, "{}: {}", field, transition(event, *field));
        }
        let _ = writeln!(body);
        let _ = writeln!(
            body,
            "Reading at {}",
            current.created_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let _ = writeln!(body, "Temperature: {}", optional(current.temperature, " °C"));
        let _ = writeln!(body, "Humidity: {}", optional(current.humidity, " %"));
        let _ = writeln!(
            body,
            "Light intensity: {}",
            optional(current.light_intensity, " lx")
        );

        body
    }

    pub fn mail(&self, event: &AlertEvent, to: Vec<String>) -> MailMessage {
        MailMessage::new(to, self.subject(event), self.mail_body(event))
    }

    /// Discord-style payload: a one-line `content` plus an embed listing each change
    pub fn webhook_payload(&self, event: &AlertEvent) -> Value {
        let raining = event.current.rain_status == Some(RainStatus::Rain);

        let fields: Vec<Value> = event
            .changed_fields
            .iter()
            .map(|field| {
                json!({
                    "name": field.as_str(),
                    "value": transition(event, *field),
                    "inline": true,
                })
            })
            .collect();

        json!({
            "content": self.subject(event),
            "embeds": [{
                "title": format!("Device {}", self.label(event)),
                "color": if raining { RAIN_COLOR } else { DRY_COLOR },
                "fields": fields,
                "timestamp": event.current.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            }],
        })
    }

    pub fn webhook(&self, event: &AlertEvent, url: String) -> WebhookMessage {
        WebhookMessage {
            url,
            payload: self.webhook_payload(event),
        }
    }
}
