//! Process categorization based on a priority-ordered pattern table.

/// Fallback category for processes no pattern matches.
pub const OTHER: &str = "other";

/// Priority-ordered pattern table: first matching row wins.
///
/// Patterns are matched as case-insensitive substrings of the process name,
/// falling back to the command line when the name does not match.
const PRESETS: &[(&str, &[&str])] = &[
    (
        "dev-server",
        &[
            "node", "npm", "yarn", "pnpm", "bun", "deno", "vite", "webpack", "esbuild", "next",
            "nuxt", "remix", "astro", "turbo", "parcel", "cargo", "rustc", "flask", "uvicorn",
            "gunicorn", "rails",
        ],
    ),
    (
        "database",
        &[
            "postgres",
            "mysql",
            "mariadb",
            "redis",
            "mongo",
            "sqlite",
            "cockroach",
            "clickhouse",
            "cassandra",
            "elasticsearch",
            "memcached",
        ],
    ),
    (
        "web-server",
        &[
            "nginx", "apache", "httpd", "caddy", "traefik", "lighttpd", "envoy",
        ],
    ),
    (
        "system",
        &[
            "launchd", "systemd", "init", "dbus", "udev", "kernel", "rapportd", "sharingd",
            "airplay", "mds", "spotlight", "svchost", "services",
        ],
    ),
];

/// All category names the preset table can produce, in priority order,
/// with the fallback last. Used for stable group ordering.
pub const ALL_CATEGORIES: &[&str] = &["dev-server", "database", "web-server", "system", OTHER];

/// Categorize a process by name, then by command line.
pub fn categorize(process_name: &str, command: &str) -> &'static str {
    let name = process_name.to_lowercase();
    let command = command.to_lowercase();

    for (category, patterns) in PRESETS {
        if patterns.iter().any(|p| name.contains(p)) {
            return category;
        }
        if patterns.iter().any(|p| command.contains(p)) {
            return category;
        }
    }
    OTHER
}
