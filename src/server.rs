use swerver_core::{Selector, ServeConfig};

/// Print startup banner with configuration
pub fn print_startup_info(config: &ServeConfig, endpoints: &[String]) {
    let scheme = if config.ssl.is_enabled() {
        "https"
    } else {
        "http"
    };

    println!("🚀 {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!("   Serving!");
    println!();
    println!("📁 Public directory: {}", config.public.display());
    for endpoint in endpoints {
        println!("   - Local:  {scheme}://localhost:{endpoint}");
    }
    println!();

    println!("🔧 Configuration:");
    println!("   Clean URLs:       {}", selector_label(&config.clean_urls));
    println!(
        "   Directory listing: {}",
        selector_label(&config.directory_listing)
    );
    if !config.rewrites.is_empty() {
        println!("   Rewrites:         {} configured", config.rewrites.len());
    }
    if !config.redirects.is_empty() {
        println!("   Redirects:        {} configured", config.redirects.len());
    }
    if !config.proxy.is_empty() {
        println!("   Proxy routes:     {} configured", config.proxy.len());
    }
    println!(
        "   Compression:      {}",
        if config.no_compression {
            "disabled"
        } else {
            "enabled"
        }
    );
    if config.symlinks {
        println!("   Symlinks:         resolved");
    }
    if config.ssl.is_enabled() {
        println!("   TLS:              enabled");
    }

    println!();
    println!("🚀 Server starting...");
}

fn selector_label(selector: &Selector) -> String {
    match selector {
        Selector::All => "enabled".to_string(),
        Selector::Disabled => "disabled".to_string(),
        Selector::Globs(globs) => format!("{} pattern(s)", globs.len()),
    }
}
