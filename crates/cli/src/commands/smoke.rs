use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

use crate::commands::CommandResult;
use siteops_core::config::{AppConfig, LoadOptions};
use siteops_core::domain::request::{Division, RequestStatus};
use siteops_core::domain::user::{Role, User, UserId};
use siteops_core::lifecycle::{plan_transition, submit, RequestEvent, SubmitInput};
use siteops_db::connect_with_settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("lifecycle_probe"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("schema_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    checks.push(lifecycle_probe());

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("schema_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("schema_visibility"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let schema_started = Instant::now();
    let schema_result = runtime.block_on(async {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('portal_user', 'site_assignment', 'expense_request')",
        )
        .fetch_one(&pool)
        .await
        .map_err(|error| error.to_string())?;
        pool.close().await;
        Ok::<i64, String>(count)
    });

    checks.push(match schema_result {
        Ok(3) => SmokeCheck {
            name: "schema_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: schema_started.elapsed().as_millis() as u64,
            message: "baseline portal tables are present".to_string(),
        },
        Ok(found) => SmokeCheck {
            name: "schema_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: schema_started.elapsed().as_millis() as u64,
            message: format!(
                "expected 3 baseline tables, found {found}; run `siteops migrate` first"
            ),
        },
        Err(error) => SmokeCheck {
            name: "schema_visibility",
            status: SmokeStatus::Fail,
            elapsed_ms: schema_started.elapsed().as_millis() as u64,
            message: format!("schema query failed: {error}"),
        },
    });

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

/// Pure in-process probe of the approval path: submit as a PIC, approve
/// as the routed RPM, approve at the executive gate, complete as ops.
fn lifecycle_probe() -> SmokeCheck {
    let started = Instant::now();

    let pic = User {
        id: UserId("smoke-pic".to_string()),
        name: "Smoke Pic".to_string(),
        role: Role::Pic,
        division: Division::Permit,
    };
    let rpm = User {
        id: UserId("smoke-rpm".to_string()),
        name: "Smoke Rpm".to_string(),
        role: Role::Rpm,
        division: Division::Permit,
    };
    let top = User {
        id: UserId("smoke-top".to_string()),
        name: "Smoke Top".to_string(),
        role: Role::TopManagement,
        division: Division::Rpm,
    };
    let ops = User {
        id: UserId("smoke-ops".to_string()),
        name: "Smoke Ops".to_string(),
        role: Role::Ops,
        division: Division::Ops("wifi".to_string()),
    };

    let result = (|| -> Result<RequestStatus, String> {
        let now = Utc::now();
        let mut request = submit(
            SubmitInput {
                activity_id: "SMOKE-0001".to_string(),
                request_type: "Smoke probe".to_string(),
                detail_plan: "In-process lifecycle probe".to_string(),
                division: Division::Permit,
                date: now,
                nominal: "150000".to_string(),
                bank: "BCA".to_string(),
                bank_account_number: "0000000000".to_string(),
                rpm: Some("Smoke Rpm".to_string()),
                rpm_id: None,
                site_ref: None,
            },
            &pic,
            now,
        )
        .map_err(|error| error.to_string())?;

        for (event, actor) in [
            (RequestEvent::RpmApprove, &rpm),
            (RequestEvent::TopApprove, &top),
            (RequestEvent::OpsComplete, &ops),
        ] {
            let plan =
                plan_transition(&request, &event, actor).map_err(|error| error.to_string())?;
            request.apply_transition(&plan, now).map_err(|error| error.to_string())?;
        }

        if !request.audit_fields_consistent() {
            return Err("audit fields inconsistent after the approval path".to_string());
        }
        Ok(request.status)
    })();

    match result {
        Ok(RequestStatus::Done) => SmokeCheck {
            name: "lifecycle_probe",
            status: SmokeStatus::Pass,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message: "approval path reached `done`".to_string(),
        },
        Ok(other) => SmokeCheck {
            name: "lifecycle_probe",
            status: SmokeStatus::Fail,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message: format!("approval path ended at `{}` instead of `done`", other.as_str()),
        },
        Err(error) => SmokeCheck {
            name: "lifecycle_probe",
            status: SmokeStatus::Fail,
            elapsed_ms: started.elapsed().as_millis() as u64,
            message: error,
        },
    }
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped because an earlier check failed".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let all_pass = checks.iter().all(|check| check.status == SmokeStatus::Pass);
    let status = if all_pass { SmokeStatus::Pass } else { SmokeStatus::Fail };
    let summary = if all_pass {
        "smoke: all readiness checks passed".to_string()
    } else {
        "smoke: one or more readiness checks failed".to_string()
    };

    let report = SmokeReport { command: "smoke", status, summary, total_elapsed_ms, checks };
    let output = serde_json::to_string_pretty(&report)
        .unwrap_or_else(|error| format!("smoke serialization failed: {error}"));

    CommandResult { exit_code: if all_pass { 0 } else { 1 }, output }
}

#[cfg(test)]
mod tests {
    use super::lifecycle_probe;

    #[test]
    fn lifecycle_probe_passes_without_any_backing_store() {
        let check = lifecycle_probe();
        assert_eq!(check.name, "lifecycle_probe");
        assert_eq!(format!("{:?}", check.status), "Pass");
    }
}
