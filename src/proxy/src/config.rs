use chaos::Strategy;

const DEFAULT_TIME_LIMIT_MS: u64 = 1000;
const DEFAULT_GRAPH_FILE: &str = "paths.gv";

/// One local-port -> backend-port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub local: u16,
    pub remote: u16,
}

/// Proxy process configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub mappings: Vec<PortMapping>,
    /// Backend hosts; bare identifiers expand to loopback aliases.
    pub hosts: Vec<String>,
    pub strategy: Strategy,
    /// Upper bound on injected delay per request, in milliseconds.
    pub time_limit_ms: u64,
    /// Percentage of the bound above which a delay becomes a crash.
    pub crash_percent: u64,
    /// Path-tree graph output file.
    pub graph_file: String,
}

pub fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  pact-proxy -p <local>:<remote> -s <host,...> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -p <local>:<remote>   Port mapping, may be repeated");
    eprintln!("  -s <id,...>           Backend hosts; a bare id X means 127.0.0.X");
    eprintln!("  -v <off|random|freq|tree>  Injection strategy (default: random)");
    eprintln!("  -t <ms>               Max injected delay per request (default: 1000)");
    eprintln!("  -x <pct>              Crash trigger percentage of the delay bound;");
    eprintln!("                        0 disables crashes (default: 0)");
    eprintln!("  -o <file>             Path-tree graph output file (default: paths.gv)");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  pact-proxy -p 14001:24001 -s 10,11,12 -v freq -t 1000 -x 80");
}

impl ProxyConfig {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        let mut mappings = Vec::new();
        let mut hosts = Vec::new();
        let mut strategy = Strategy::Random;
        let mut time_limit_ms = DEFAULT_TIME_LIMIT_MS;
        let mut crash_percent = 0;
        let mut graph_file = DEFAULT_GRAPH_FILE.to_string();

        let mut i = 0;
        while i < args.len() {
            let flag = &args[i];
            let value = args
                .get(i + 1)
                .ok_or_else(|| format!("missing value for {}", flag))?;

            match flag.as_str() {
                "-p" => mappings.push(parse_mapping(value)?),
                "-s" => {
                    for id in value.split(',') {
                        let id = id.trim();
                        if id.is_empty() {
                            continue;
                        }
                        if id.contains('.') {
                            hosts.push(id.to_string());
                        } else {
                            hosts.push(format!("127.0.0.{}", id));
                        }
                    }
                }
                "-v" => {
                    strategy = Strategy::parse(value)
                        .ok_or_else(|| format!("unknown strategy: {}", value))?;
                }
                "-t" => {
                    time_limit_ms = value
                        .parse()
                        .map_err(|_| format!("invalid time limit: {}", value))?;
                }
                "-x" => {
                    crash_percent = value
                        .parse()
                        .map_err(|_| format!("invalid crash percentage: {}", value))?;
                    if crash_percent > 100 {
                        return Err(format!("crash percentage out of range: {}", value));
                    }
                }
                "-o" => graph_file = value.to_string(),
                _ => return Err(format!("unknown flag: {}", flag)),
            }
            i += 2;
        }

        if mappings.is_empty() {
            return Err("at least one -p mapping is required".to_string());
        }
        if hosts.is_empty() {
            return Err("at least one -s backend host is required".to_string());
        }

        Ok(ProxyConfig {
            mappings,
            hosts,
            strategy,
            time_limit_ms,
            crash_percent,
            graph_file,
        })
    }
}

fn parse_mapping(value: &str) -> Result<PortMapping, String> {
    let (local, remote) = value
        .split_once(':')
        .ok_or_else(|| format!("invalid mapping (expected local:remote): {}", value))?;
    Ok(PortMapping {
        local: local
            .parse()
            .map_err(|_| format!("invalid local port: {}", local))?,
        remote: remote
            .parse()
            .map_err(|_| format!("invalid remote port: {}", remote))?,
    })
}
