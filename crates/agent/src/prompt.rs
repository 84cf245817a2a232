//! System prompt construction.
//!
//! Four variants, chosen by whether the tool set includes a shell and
//! whether screen control is reserved for remote tools (`api` mode).

use chrono::{Local, NaiveDate};

use deskpilot_config::ExecMode;
use deskpilot_tools::ToolGroup;

/// Host facts embedded in the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub arch: String,
    pub display: String,
    pub date: NaiveDate,
}

impl PromptContext {
    /// Facts about the current host. `DISPLAY` wins over the configured
    /// display number.
    pub fn current(display_num: Option<u32>) -> Self {
        let display = std::env::var("DISPLAY")
            .ok()
            .filter(|d| !d.is_empty())
            .or_else(|| display_num.map(|n| format!(":{n}")))
            .unwrap_or_else(|| ":1".to_string());
        Self {
            arch: std::env::consts::ARCH.to_string(),
            display,
            date: Local::now().date_naive(),
        }
    }
}

/// Render the system prompt for a tool group and exec mode.
///
/// A non-empty `suffix` is appended after a single space.
pub fn system_prompt(group: &ToolGroup, exec_mode: ExecMode, suffix: &str, ctx: &PromptContext) -> String {
    let api_only = exec_mode == ExecMode::Api;
    let body = match (group.has_shell(), api_only) {
        (true, false) => full_prompt(ctx),
        (true, true) => api_prompt(ctx),
        (false, false) => no_shell_prompt(ctx),
        (false, true) => no_shell_api_prompt(ctx),
    };

    if suffix.is_empty() {
        body
    } else {
        format!("{body} {suffix}")
    }
}

fn date_line(ctx: &PromptContext) -> String {
    format!("* The current date is {}.", ctx.date.format("%A, %B %-d, %Y"))
}

fn machine_line(ctx: &PromptContext) -> String {
    format!(
        "* You are utilising an Ubuntu virtual machine using {} architecture with internet access.",
        ctx.arch
    )
}

const SHELL_INSTALL: &str =
    "* You can feel free to install Ubuntu applications with your bash tool. Use curl instead of wget.";
const BROWSER_OPEN: &str =
    "* To open firefox, please just click on the firefox icon.  Note, firefox-esr is what is installed on your system.";
const LARGE_OUTPUT: &str = "* When using your bash tool with commands that are expected to output very large quantities of text, redirect into a tmp file and use str_replace_editor or `grep -n -B <lines before> -A <lines after> <query> <filename>` to confirm output.";
const ZOOM_OUT: &str = "* When viewing a page it can be helpful to zoom out so that you can see everything on the page.  Either that, or make sure you scroll down to see everything before deciding something isn't available.";
const CHAIN_CALLS: &str = "* When using your computer function calls, they take a while to run and send back to you.  Where possible/feasible, try to chain multiple of these calls all into one function calls request.";
const WIZARD: &str = "* When using Firefox, if a startup wizard appears, IGNORE IT.  Do not even click \"skip this step\".  Instead, click on the address bar where it says \"Search or enter address\", and enter the appropriate search term or URL there.";
const PDF: &str = "* If the item you are looking at is a pdf, if after taking a single screenshot of the pdf it seems that you want to read the entire document instead of trying to continue to read the pdf from your screenshots + navigation, determine the URL, use curl to download the pdf, install and use pdftotext to convert it to a text file, and then read that text file directly with your StrReplaceEditTool.";

fn capability(lines: &[&str]) -> String {
    format!("<SYSTEM_CAPABILITY>\n{}\n</SYSTEM_CAPABILITY>", lines.join("\n"))
}

fn important(lines: &[&str]) -> String {
    format!("<IMPORTANT>\n{}\n</IMPORTANT>", lines.join("\n"))
}

fn full_prompt(ctx: &PromptContext) -> String {
    let gui = format!(
        "* Using bash tool you can start GUI applications, but you need to set export DISPLAY={d} and use a subshell. For example \"(DISPLAY={d} xterm &)\". GUI apps run with bash tool will appear within your desktop environment, but they may take some time to appear. Take a screenshot to confirm it did.",
        d = ctx.display
    );
    let (machine, date) = (machine_line(ctx), date_line(ctx));
    format!(
        "{}\n\n{}",
        capability(&[machine.as_str(), SHELL_INSTALL, BROWSER_OPEN, gui.as_str(), LARGE_OUTPUT, ZOOM_OUT, CHAIN_CALLS, date.as_str()]),
        important(&[WIZARD, PDF])
    )
}

fn api_prompt(ctx: &PromptContext) -> String {
    let (machine, date) = (machine_line(ctx), date_line(ctx));
    format!(
        "{}\n\n{}",
        capability(&[machine.as_str(), SHELL_INSTALL, LARGE_OUTPUT, CHAIN_CALLS, date.as_str()]),
        important(&[PDF])
    )
}

fn no_shell_prompt(ctx: &PromptContext) -> String {
    let (machine, date) = (machine_line(ctx), date_line(ctx));
    format!(
        "{}\n\n{}",
        capability(&[machine.as_str(), BROWSER_OPEN, ZOOM_OUT, CHAIN_CALLS, date.as_str()]),
        important(&[WIZARD])
    )
}

fn no_shell_api_prompt(ctx: &PromptContext) -> String {
    let (machine, date) = (machine_line(ctx), date_line(ctx));
    format!("{}\n", capability(&[machine.as_str(), CHAIN_CALLS, date.as_str()]))
}
