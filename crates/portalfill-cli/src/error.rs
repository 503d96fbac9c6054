use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("chromium not found") || msg.contains("chromium executable does not exist") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Install Google Chrome or Chromium, or point PortalFill at it with:");
        eprintln!("  {} export PORTALFILL_CHROMIUM=/path/to/chrome", "$".dimmed());
    }

    if msg.contains("mapping config error") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check the mapping files under <project root>/config, or pass one with:");
        eprintln!(
            "  {} portalfill --profile /abs/path/clinic.mapping.json ...",
            "$".dimmed()
        );
    }

    if msg.contains("patientsearch") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  List the fields PortalFill can see on the portal page with:");
        eprintln!("  {} portalfill diagnose --wait", "$".dimmed());
    }

    if msg.contains("consultations list") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Run collect without --now and navigate to the list before pressing Enter.");
    }

    std::process::exit(1);
}
