//! Threshold checks for a single reading.

use crate::config::Thresholds;
use crate::types::Readings;

/// Alerts for every breached metric, always in CPU, RAM, disk, temperature order.
///
/// Stateless: a metric that stays above its threshold alerts on every call.
pub fn evaluate(r: &Readings, t: &Thresholds) -> Vec<String> {
    let mut alerts = Vec::new();

    if r.cpu_percent >= t.cpu_percent {
        alerts.push(format!("High CPU usage: {:.1}%", r.cpu_percent));
    }
    if r.ram_percent >= t.ram_percent {
        alerts.push(format!("High RAM usage: {:.1}%", r.ram_percent));
    }
    if r.disk_percent >= t.disk_percent {
        alerts.push(format!("Disk almost full: {:.1}%", r.disk_percent));
    }
    if let Some(temp) = r.cpu_temp {
        if temp >= t.temp_celsius {
            alerts.push(format!("High CPU temperature: {temp:.1}°C"));
        }
    }

    alerts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(cpu: f64, ram: f64, disk: f64, temp: Option<f64>) -> Readings {
        Readings {
            cpu_percent: cpu,
            ram_percent: ram,
            ram_used_gb: 1.0,
            ram_total_gb: 4.0,
            disk_percent: disk,
            disk_used_gb: 10.0,
            disk_total_gb: 32.0,
            cpu_temp: temp,
            uptime_seconds: 60,
        }
    }

    #[test]
    fn cpu_and_disk_breach_in_order() {
        let a = evaluate(&readings(85.0, 50.0, 95.0, None), &Thresholds::default());
        assert_eq!(a.len(), 2);
        assert!(a[0].contains("CPU") && a[0].contains("85.0%"), "{a:?}");
        assert!(a[1].contains("Disk") && a[1].contains("95.0%"), "{a:?}");
    }

    #[test]
    fn all_four_in_fixed_order() {
        let a = evaluate(
            &readings(99.0, 99.0, 99.0, Some(90.0)),
            &Thresholds::default(),
        );
        assert_eq!(a.len(), 4);
        assert!(a[0].contains("CPU usage"));
        assert!(a[1].contains("RAM"));
        assert!(a[2].contains("Disk"));
        assert!(a[3].contains("temperature") && a[3].contains("90.0°C"));
    }

    #[test]
    fn threshold_is_inclusive() {
        let a = evaluate(&readings(80.0, 79.9, 90.0, Some(70.0)), &Thresholds::default());
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn nothing_below_thresholds() {
        assert!(evaluate(&readings(1.0, 2.0, 3.0, Some(40.0)), &Thresholds::default()).is_empty());
    }

    #[test]
    fn absent_temperature_never_alerts() {
        let t = Thresholds {
            temp_celsius: 0.0,
            ..Thresholds::default()
        };
        assert!(evaluate(&readings(0.0, 0.0, 0.0, None), &t).is_empty());
    }

    #[test]
    fn zero_temperature_is_compared() {
        let t = Thresholds {
            temp_celsius: 0.0,
            ..Thresholds::default()
        };
        let a = evaluate(&readings(0.0, 0.0, 0.0, Some(0.0)), &t);
        assert_eq!(a, vec!["High CPU temperature: 0.0°C".to_string()]);
    }

    #[test]
    fn repeated_calls_repeat_alerts() {
        let r = readings(90.0, 10.0, 10.0, None);
        let t = Thresholds::default();
        assert_eq!(evaluate(&r, &t), evaluate(&r, &t));
        assert_eq!(evaluate(&r, &t).len(), 1);
    }
}
