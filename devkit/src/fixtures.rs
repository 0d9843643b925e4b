/*!
Fixtures JSON pour l'orchestrateur ESXi

Construit les payloads tels que le backend les sert (hosts, jobs, patches),
pour pré-remplir le stub ou comparer des réponses.
*/

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};

/// Host fraîchement ajouté: seul `ip_address` est renseigné
pub fn host(ip: &str) -> Value {
    json!({
        "ip_address": ip,
        "hostname": null,
        "current_build": null,
        "target_build": null,
        "status": "pending",
        "ssh_enabled": null,
        "last_checked": null,
    })
}

/// Host inventorié avec build et statut
pub fn host_with_status(ip: &str, hostname: &str, build: &str, status: &str) -> Value {
    json!({
        "ip_address": ip,
        "hostname": hostname,
        "current_build": build,
        "target_build": null,
        "status": status,
        "ssh_enabled": true,
        "last_checked": now(),
    })
}

pub fn job(id: u64, ip: &str, job_type: &str, status: &str) -> Value {
    let finished = status != "running";
    json!({
        "id": id,
        "host_ip": ip,
        "job_type": job_type,
        "status": status,
        "started_at": now(),
        "completed_at": if finished { Value::String(now()) } else { Value::Null },
        "error_message": null,
    })
}

/// Patch stocké côté serveur; taille en MB, date en epoch secondes
pub fn patch(filename: &str, size_bytes: usize) -> Value {
    let size_mb = (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;
    json!({
        "filename": filename,
        "size": size_mb,
        "uploaded": Utc::now().timestamp() as f64,
    })
}

/// Horodatage naïf façon backend Python (`2024-01-15T10:30:00.123456`)
pub fn now() -> String {
    Utc::now()
        .to_rfc3339_opts(SecondsFormat::Micros, true)
        .trim_end_matches('Z')
        .to_string()
}
