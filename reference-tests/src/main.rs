//! Reference test binary entry point
//!
//! Runs every closed-form scenario and exits non-zero if any check fails.
//!
//! Usage: `reference-tests [config.json]`. Without a config file every
//! provider runs CPU-only.

use reference_tests::{ReferenceTest, Scenario, TestResult};
use tracing_subscriber::EnvFilter;

/// Get all tests, each bound to the same optional config file
fn all_tests(config_path: Option<String>) -> Vec<ReferenceTest> {
    vec![
        // Equal masses, G = 1, unit separation; one full period.
        ReferenceTest {
            name: "Kepler Circular Orbit".to_string(),
            config_path: config_path.clone(),
            scenario: Scenario::KeplerOrbit {
                steps_per_orbit: 2000,
            },
        },
        // nu = 1/6 at omega = 1; amplitude decays to about 45%.
        ReferenceTest {
            name: "LBM Shear Wave Decay".to_string(),
            config_path: config_path.clone(),
            scenario: Scenario::ShearWave {
                width: 4,
                height: 64,
                omega: 1.0,
                u0: 0.01,
                steps: 500,
            },
        },
        ReferenceTest {
            name: "SPH Free Fall".to_string(),
            config_path: config_path.clone(),
            scenario: Scenario::SphFreeFall {
                steps: 1000,
                dt: 1.0e-3,
            },
        },
        ReferenceTest {
            name: "FFT Pure Tone".to_string(),
            config_path,
            scenario: Scenario::PureTone {
                n: 1024,
                bin: 37,
                amplitude: 2.5,
            },
        },
    ]
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    tracing::info!("Kernel Reference Test Suite");
    tracing::info!("===========================");

    let config_path = std::env::args().nth(1);
    if let Some(ref path) = config_path {
        tracing::info!("Using config {path}");
    }

    let tests = all_tests(config_path);
    tracing::info!("Found {} reference tests", tests.len());

    let mut results: Vec<TestResult> = Vec::new();
    let mut passed_count = 0;
    let mut failed_count = 0;

    for test in tests {
        match test.run() {
            Ok(result) => {
                if result.passed {
                    passed_count += 1;
                } else {
                    failed_count += 1;
                }
                result.print_summary();
                results.push(result);
            }
            Err(e) => {
                eprintln!("\nERROR running test {}: {}", test.name, e);
                failed_count += 1;
            }
        }
    }

    println!("\n{}", "=".repeat(80));
    println!("OVERALL SUMMARY");
    println!("{}", "=".repeat(80));
    println!("Total tests: {}", results.len());
    println!("Passed: {}", passed_count);
    println!("Failed: {}", failed_count);
    println!("{}", "=".repeat(80));

    if failed_count > 0 {
        std::process::exit(1);
    }
}
