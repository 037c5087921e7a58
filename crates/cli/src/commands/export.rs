use std::collections::HashMap;
use std::path::Path;

use crate::commands::CommandResult;
use siteops_core::config::{AppConfig, LoadOptions};
use siteops_core::domain::request::ExpenseRequest;
use siteops_core::export::export_csv;
use siteops_db::repositories::{
    RequestFilter, RequestRepository, SiteRepository, SqlRequestRepository, SqlSiteRepository,
};
use siteops_db::connect_with_settings;

/// Operator-side export of the full stored request set, using the same
/// column contract as the portal's export endpoint.
pub fn run(out: &Path) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "export",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "export",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let requests = SqlRequestRepository::new(pool.clone())
            .list(&RequestFilter::default())
            .await
            .map_err(|error| ("query", error.to_string(), 5u8))?;

        let sites = SqlSiteRepository::new(pool.clone())
            .list()
            .await
            .map_err(|error| ("query", error.to_string(), 5u8))?
            .into_iter()
            .map(|site| (site.site_id.0.clone(), site))
            .collect::<HashMap<_, _>>();

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>((requests, sites))
    });

    let (requests, sites) = match result {
        Ok(loaded) => loaded,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("export", error_class, message, exit_code);
        }
    };

    let refs: Vec<&ExpenseRequest> = requests.iter().collect();
    let bytes = match export_csv(&refs, &sites) {
        Ok(bytes) => bytes,
        Err(error) => {
            return CommandResult::failure("export", "serialization", error.to_string(), 5);
        }
    };

    if let Err(error) = std::fs::write(out, &bytes) {
        return CommandResult::failure(
            "export",
            "io",
            format!("failed to write `{}`: {error}", out.display()),
            6,
        );
    }

    CommandResult::success(
        "export",
        format!("exported {} requests to `{}`", refs.len(), out.display()),
    )
}
