//! Interactive CLI setup wizard for first-time configuration
//!
//! Walks the operator through the orchestrator location, remembered
//! credentials, refresh cadence and the default patching settings.

use anyhow::{Context, Result};
use reqwest::Url;
use std::path::Path;
use std::time::Duration;

use crate::api::{HttpOrchestrator, OrchestratorApi};
use crate::config::{ApiConfig, CredentialsConfig, DashboardConfig, RefreshConfig};
use crate::models::{Settings, SETTING_AUTO_PHASE2_WINDOW, SETTING_REBOOT_GRACE_PERIOD};
use crate::prompt::{
    prompt_optional_parse, prompt_password, prompt_with_default, prompt_with_default_parse,
    prompt_yes_no,
};
use crate::session::Credentials;

pub struct SetupWizard;

impl SetupWizard {
    /// Run the interactive setup wizard, starting from `current`
    pub async fn run(current: &DashboardConfig, path: Option<&Path>) -> Result<()> {
        println!();
        println!("🖥️  ======================================");
        println!("   ESXI DASHBOARD CONFIGURATION WIZARD");
        println!("🖥️  ======================================");
        println!();

        // Step 1: Orchestrator API
        let api = Self::configure_api(&current.api).await?;

        // Step 2: Credentials
        let credentials = Self::configure_credentials(&api, &current.credentials).await?;

        // Step 3: Refresh
        let refresh = Self::configure_refresh(&current.refresh)?;

        // Step 4: Patching defaults
        let settings = Self::configure_settings(&current.settings)?;

        let config = DashboardConfig {
            api,
            refresh,
            credentials,
            settings,
        };

        Self::display_summary(&config);

        if prompt_yes_no("💾 Save this configuration?", true)? {
            config
                .save(path)
                .await
                .context("Failed to save configuration")?;

            println!();
            println!("✅ Configuration saved successfully!");
            println!("🚀 Run `esxi-dash status` to see your hosts.");
            println!();
        } else {
            println!("❌ Configuration cancelled.");
        }

        Ok(())
    }

    async fn configure_api(current: &ApiConfig) -> Result<ApiConfig> {
        println!("📡 ORCHESTRATOR API");
        println!("────────────────────────────────────────");
        println!("Base URL of the ESXi orchestrator REST API.");
        println!();

        let base_url = loop {
            let candidate = prompt_with_default("API base URL", &current.base_url)?;
            match HttpOrchestrator::new(&candidate) {
                Ok(_) => break candidate,
                Err(e) => println!("❌ {}. Please try again.", e),
            }
        };

        let timeout: Option<u64> =
            prompt_optional_parse("Request timeout in seconds (leave empty for none)")?;

        println!("🔍 Testing connection...");
        match Self::test_connection(&base_url).await {
            Ok(true) => println!("✅ Connection successful!"),
            Ok(false) => println!("⚠️  Connection failed, but configuration will be saved."),
            Err(e) => println!(
                "⚠️  Connection test error: {} - Configuration will be saved anyway.",
                e
            ),
        }
        println!();

        Ok(ApiConfig {
            base_url,
            request_timeout_secs: timeout,
        })
    }

    async fn configure_credentials(
        api: &ApiConfig,
        current: &CredentialsConfig,
    ) -> Result<CredentialsConfig> {
        println!("🔐 ADMIN CREDENTIALS");
        println!("────────────────────────────────────────");
        println!("Admin commands send HTTP Basic credentials with every request.");
        println!();

        let remember = prompt_yes_no(
            "Remember admin credentials (password in OS keyring)?",
            current.remember,
        )?;
        if !remember {
            println!();
            return Ok(CredentialsConfig::default());
        }

        let username = prompt_with_default(
            "Admin username",
            current.username.as_deref().unwrap_or("admin"),
        )?;
        println!("⚠️  Note: Password will be stored in OS keyring (Keychain/Credential Manager)");
        let cached_password = prompt_password("Admin password")?;

        if let Some(password) = &cached_password {
            println!("🔍 Verifying credentials...");
            let orchestrator = HttpOrchestrator::with_timeout(
                &api.base_url,
                Some(Duration::from_secs(api.request_timeout_secs.unwrap_or(10))),
            )?;
            let credentials = Credentials::new(username.clone(), password.clone());
            match orchestrator.list_hosts(Some(&credentials)).await {
                Ok(_) => println!("✅ Credentials accepted."),
                Err(e) => println!("⚠️  Could not verify credentials: {}", e),
            }
        }
        println!();

        Ok(CredentialsConfig {
            remember,
            username: Some(username),
            cached_password,
        })
    }

    fn configure_refresh(current: &RefreshConfig) -> Result<RefreshConfig> {
        println!("🔄 AUTO-REFRESH");
        println!("────────────────────────────────────────");

        let interval_secs: u64 = prompt_with_default_parse(
            "Refresh interval (seconds)",
            &current.interval_secs.to_string(),
        )?;

        let job_window_hours: Option<u32> =
            prompt_optional_parse("Job history window in hours (leave empty for all jobs)")?;
        println!();

        Ok(RefreshConfig {
            interval_secs: interval_secs.max(1),
            job_window_hours,
        })
    }

    fn configure_settings(current: &Settings) -> Result<Settings> {
        println!("⚙️  PATCHING DEFAULTS");
        println!("────────────────────────────────────────");
        println!("Pre-filled values for `esxi-dash settings`.");
        println!();

        let mut settings = current.clone();
        for (key, label, fallback) in [
            (SETTING_AUTO_PHASE2_WINDOW, "Auto Phase 2 window (minutes)", "10"),
            (SETTING_REBOOT_GRACE_PERIOD, "Reboot grace period (minutes)", "2"),
        ] {
            let default = current.get(key).map(String::as_str).unwrap_or(fallback);
            let value: u32 = prompt_with_default_parse(label, default)?;
            settings.insert(key.to_string(), value.to_string());
        }
        println!();

        Ok(settings)
    }

    fn display_summary(config: &DashboardConfig) {
        println!("📋 CONFIGURATION SUMMARY");
        println!("────────────────────────────────────────");

        println!("📡 API:");
        println!("   Base URL: {}", config.api.base_url);
        println!(
            "   Timeout: {}",
            config
                .api
                .request_timeout_secs
                .map(|secs| format!("{}s", secs))
                .unwrap_or_else(|| "Transport default".to_string())
        );

        println!();
        println!("🔐 Credentials:");
        println!(
            "   Remember: {}",
            if config.credentials.remember { "✅ Yes" } else { "❌ No" }
        );
        if let Some(username) = &config.credentials.username {
            println!("   Username: {}", username);
        }

        println!();
        println!("🔄 Refresh:");
        println!("   Interval: {}s", config.refresh.interval_secs);
        println!(
            "   Job window: {}",
            config
                .refresh
                .job_window_hours
                .map(|hours| format!("{}h", hours))
                .unwrap_or_else(|| "All jobs".to_string())
        );

        println!();
        println!("⚙️  Settings:");
        for (key, value) in &config.settings {
            println!("   {}: {}", key, value);
        }
        println!();
    }

    /// TCP reachability of the API host
    async fn test_connection(base_url: &str) -> Result<bool> {
        let url = Url::parse(base_url)?;
        let host = url
            .host_str()
            .ok_or_else(|| anyhow::anyhow!("URL has no host"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("URL has no port"))?;

        let connect = tokio::net::TcpStream::connect((host, port));
        match tokio::time::timeout(Duration::from_secs(5), connect).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(_)) | Err(_) => Ok(false),
        }
    }
}
