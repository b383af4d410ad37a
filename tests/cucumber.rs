//! Cucumber test runner for behavioural tests.
//!
//! Runs `tests/features/session_lifecycle.feature` against a
//! [`SessionWorld`](steps::SessionWorld): a real server driven through its
//! polling entry point with a recording worker.

mod steps;

use cucumber::World;
use steps::SessionWorld;

#[tokio::main]
async fn main() { SessionWorld::run("tests/features/session_lifecycle.feature").await; }
