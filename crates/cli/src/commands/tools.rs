//! `deskpilot tools`: show the tool list a session would publish.

use anyhow::Context;

use deskpilot_agent::{LoopConfig, SamplingLoop, ToolDispatcher};
use deskpilot_config::{AppConfig, ExecMode};
use deskpilot_core::tool::ToolDescriptor;
use deskpilot_tools::ToolGroup;

pub async fn run(remote: bool, json: bool) -> anyhow::Result<()> {
    let config = AppConfig::load().context("Failed to load config")?;

    let descriptors = if remote {
        let provider = deskpilot_providers::build_from_config(&config).context("Failed to set up provider")?;
        let agent = SamplingLoop::new(provider, LoopConfig::from_app_config(&config));
        let mut dispatcher = agent.build_dispatcher().await;
        let descriptors = dispatcher.descriptors();
        dispatcher.close().await;
        descriptors
    } else {
        let local = deskpilot_tools::registry_for(config.tool_version, config.exec_mode, &config.display);
        ToolDispatcher::local_only(local).descriptors()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    let group = ToolGroup::for_version(config.tool_version);
    println!("Tool version: {}", config.tool_version);
    println!("Beta flag:    {}", group.beta_flag.unwrap_or("none"));
    println!("Exec mode:    {}", exec_mode_label(config.exec_mode));
    println!();
    for descriptor in &descriptors {
        println!("  {}", describe(descriptor));
    }
    if descriptors.is_empty() {
        println!("  (no tools)");
    }
    Ok(())
}

fn exec_mode_label(mode: ExecMode) -> &'static str {
    match mode {
        ExecMode::Mixed => "mixed (local + remote)",
        ExecMode::Api => "api (no local screen control)",
        ExecMode::Local => "local (no remote servers)",
    }
}

fn describe(descriptor: &ToolDescriptor) -> String {
    match &descriptor.builtin {
        Some(builtin) => format!("{:<20} [{}]", descriptor.name, builtin.tool_type),
        None => format!("{:<20} {}", descriptor.name, descriptor.description),
    }
}
