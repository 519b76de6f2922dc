//! Testset execution.
//!
//! A testset runs in four phases against one cluster:
//!
//! 1. **setup** once, seeded with the initial seed;
//! 2. each requested **test**, in order, followed by **test_teardown**;
//! 3. **teardown** once, whatever happened before.
//!
//! Failures (returned errors and panics alike) are contained per phase and
//! collected into a [`TestsetOutcome`]. A failed setup skips every test; a
//! failed test_teardown skips every test after it, since their results could no
//! longer be trusted.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, catch_unwind, AssertUnwindSafe};

use miette::{miette, Diagnostic, Report};
use thiserror::Error;
use tracing::debug;

use crate::cluster::Cluster;
use crate::config::HarnessConfig;
use crate::output::SharedOutput;
use crate::report::{CallReporter, ReportStyle};
use crate::requirements::Requirement;
use crate::seed::{PhaseRng, Seed, SeedChain};

pub const SETUP_FAILED: &str = "testset setup failed";
pub const TEST_TEARDOWN_FAILED: &str = "Earlier test_teardown failed";

/// Everything a phase body gets to work with.
pub struct TestContext<'a, C: Cluster> {
    pub cluster: &'a mut C,
    /// Where the body should print; captured unless running verbose.
    pub out: SharedOutput,
    /// Seeded for this phase; draws here are reproducible from the run seed.
    pub rng: &'a mut PhaseRng,
    pub config: &'a HarnessConfig,
}

pub type TestFn<T> = fn(&mut T, &mut TestContext<'_, <T as TestSet>::Cluster>) -> miette::Result<()>;

/// A registered test of a testset.
pub struct TestCase<T: TestSet> {
    pub name: &'static str,
    pub func: TestFn<T>,
}

impl<T: TestSet> TestCase<T> {
    pub fn new(name: &'static str, func: TestFn<T>) -> Self {
        Self { name, func }
    }
}

impl<T: TestSet> Clone for TestCase<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            func: self.func,
        }
    }
}

impl<T: TestSet> fmt::Debug for TestCase<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TestCase").field(&self.name).finish()
    }
}

/// Register test methods by name: `test_cases![test_a, test_b]` inside an
/// `impl TestSet` block.
#[macro_export]
macro_rules! test_cases {
    ($($name:ident),* $(,)?) => {
        vec![$($crate::runner::TestCase::new(stringify!($name), Self::$name)),*]
    };
}

/// A named, ordered collection of tests sharing setup and teardown.
pub trait TestSet: Sized {
    type Cluster: Cluster;

    /// Build a fresh instance bound to `cluster`.
    fn new(cluster: &Self::Cluster) -> Self;

    fn name(&self) -> String {
        short_type_name::<Self>()
    }

    /// Cluster shape this testset needs.
    fn requirements() -> Vec<Box<dyn Requirement<Self::Cluster>>>;

    /// Tests in their default execution order.
    fn tests() -> Vec<TestCase<Self>>;

    fn setup(&mut self, ctx: &mut TestContext<'_, Self::Cluster>) -> miette::Result<()>;

    fn teardown(&mut self, ctx: &mut TestContext<'_, Self::Cluster>) -> miette::Result<()>;

    /// Runs after every test, whether it passed or not.
    fn test_teardown(&mut self, _ctx: &mut TestContext<'_, Self::Cluster>) -> miette::Result<()> {
        Ok(())
    }
}

/// A failure of one phase invocation.
#[derive(Debug)]
pub struct TestError {
    /// Qualified name, `Testset.phase`.
    pub name: String,
    pub error: Report,
}

/// A test that was never invoked, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotRan {
    pub name: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct TestsetOutcome {
    /// Tests attempted, including ones whose test_teardown failed afterwards.
    pub executed: usize,
    pub errors: Vec<TestError>,
    pub not_ran: Vec<NotRan>,
}

impl TestsetOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.not_ran.is_empty()
    }
}

/// Position of a testset within the whole run, for the header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub position: usize,
    pub total: usize,
}

#[derive(Error, Diagnostic, Debug)]
#[error(
    "panicked: {message}{}",
    .location.as_deref().map(|l| format!(" at {}", l)).unwrap_or_default()
)]
#[diagnostic(code(harness::panic))]
pub struct PanicError {
    pub message: String,
    /// `file:line` of the panic, when the hook saw it.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase<'n> {
    Setup,
    Test(&'n str),
    TestTeardown,
    Teardown,
}

impl Phase<'_> {
    fn function(&self) -> &str {
        match self {
            Phase::Setup => "setup",
            Phase::Test(name) => *name,
            Phase::TestTeardown => "test_teardown",
            Phase::Teardown => "teardown",
        }
    }

    fn style(&self) -> ReportStyle {
        match self {
            Phase::Test(_) => ReportStyle::StatusLine,
            _ => ReportStyle::FailureOnly,
        }
    }

    fn seed(&self, chain: &SeedChain) -> Seed {
        match self {
            Phase::Setup => chain.setup,
            Phase::Test(_) => chain.test,
            Phase::TestTeardown => chain.test_teardown,
            Phase::Teardown => chain.teardown,
        }
    }
}

pub struct TestsetRunner<'a> {
    config: &'a HarnessConfig,
    out: &'a SharedOutput,
}

impl<'a> TestsetRunner<'a> {
    pub fn new(config: &'a HarnessConfig, out: &'a SharedOutput) -> Self {
        Self { config, out }
    }

    /// Run `test_names` of `testset` against `cluster`.
    ///
    /// Never fails: every phase error ends up in the returned outcome.
    pub fn run<T, S>(
        &self,
        testset: &mut T,
        cluster: &mut T::Cluster,
        test_names: &[S],
        intercept: bool,
        seed: Seed,
        progress: Option<Progress>,
    ) -> TestsetOutcome
    where
        T: TestSet,
        S: AsRef<str>,
    {
        let name = testset.name();
        match progress {
            Some(p) => self
                .out
                .line(&format!("\nStarting testset [{}/{}]: {}...", p.position, p.total, name)),
            None => self.out.line(&format!("\nStarting testset: {}...", name)),
        }

        let chain = SeedChain::new(seed);
        debug!(testset = %name, %seed, "seed chain ready");
        let registered = T::tests();
        let mut rng = PhaseRng::default();
        let mut outcome = TestsetOutcome::default();

        let setup = self.invoke(testset, cluster, &mut rng, &chain, Phase::Setup, intercept, |t, ctx| {
            t.setup(ctx)
        });

        match setup {
            Err(err) => {
                outcome.errors.push(err);
                outcome.not_ran.extend(test_names.iter().map(|test| NotRan {
                    name: test.as_ref().to_string(),
                    reason: SETUP_FAILED.to_string(),
                }));
            }
            Ok(()) => {
                for (i, test) in test_names.iter().enumerate() {
                    let test = test.as_ref();
                    let Some(case) = registered.iter().find(|c| c.name == test) else {
                        outcome.errors.push(TestError {
                            name: format!("{}.{}", name, test),
                            error: miette!("testset {} has no test named '{}'", name, test),
                        });
                        continue;
                    };

                    if !self.config.dry_run {
                        outcome.executed += 1;
                    }
                    let func = case.func;
                    if let Err(err) = self.invoke(
                        testset,
                        cluster,
                        &mut rng,
                        &chain,
                        Phase::Test(case.name),
                        intercept,
                        |t, ctx| func(t, ctx),
                    ) {
                        outcome.errors.push(err);
                    }

                    if let Err(err) = self.invoke(
                        testset,
                        cluster,
                        &mut rng,
                        &chain,
                        Phase::TestTeardown,
                        intercept,
                        |t, ctx| t.test_teardown(ctx),
                    ) {
                        outcome.errors.push(err);
                        outcome.not_ran.extend(test_names[i + 1..].iter().map(|rest| NotRan {
                            name: rest.as_ref().to_string(),
                            reason: TEST_TEARDOWN_FAILED.to_string(),
                        }));
                        break;
                    }
                }
            }
        }

        if let Err(err) = self.invoke(testset, cluster, &mut rng, &chain, Phase::Teardown, intercept, |t, ctx| {
            t.teardown(ctx)
        }) {
            outcome.errors.push(err);
        }

        outcome
    }

    /// Run every registered test of `testset` in registration order.
    pub fn run_all<T: TestSet>(
        &self,
        testset: &mut T,
        cluster: &mut T::Cluster,
        intercept: bool,
        seed: Seed,
    ) -> TestsetOutcome {
        let names: Vec<&str> = T::tests().iter().map(|c| c.name).collect();
        self.run(testset, cluster, &names, intercept, seed, None)
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke<T, F>(
        &self,
        testset: &mut T,
        cluster: &mut T::Cluster,
        rng: &mut PhaseRng,
        chain: &SeedChain,
        phase: Phase<'_>,
        intercept: bool,
        body: F,
    ) -> Result<(), TestError>
    where
        T: TestSet,
        F: FnOnce(&mut T, &mut TestContext<'_, T::Cluster>) -> miette::Result<()>,
    {
        let function = phase.function();
        let name = format!("{}.{}", testset.name(), function);
        let reporter = CallReporter::new(self.config, self.out);

        if self.config.dry_run {
            if phase.style() == ReportStyle::StatusLine {
                reporter.skip(&name, "dry run");
            }
            return Ok(());
        }

        let config = self.config;
        let seed = phase.seed(chain);
        reporter
            .call(&name, function, phase.style(), intercept, |out| {
                rng.call_seeded(Some(seed), |rng| {
                    let mut ctx = TestContext {
                        cluster,
                        out: out.clone(),
                        rng,
                        config,
                    };
                    contain_panic(|| body(testset, &mut ctx))
                })
            })
            .map_err(|error| TestError { name, error })
    }
}

/// Type name without its module path or generic arguments.
pub fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

thread_local! {
    static PANIC_LOCATION: RefCell<Option<String>> = RefCell::new(None);
}

/// Run `body`, turning a panic into a [`PanicError`].
///
/// The default hook is swapped for one that only records the panic location,
/// so nothing reaches stderr in the middle of a status line.
fn contain_panic<F>(body: F) -> miette::Result<()>
where
    F: FnOnce() -> miette::Result<()>,
{
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        let location = info.location().map(|l| format!("{}:{}", l.file(), l.line()));
        PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
    }));
    let result = catch_unwind(AssertUnwindSafe(body));
    panic::set_hook(previous);

    result.unwrap_or_else(|payload| {
        let location = PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
        Err(PanicError::from_payload(payload, location).into())
    })
}

impl PanicError {
    fn from_payload(payload: Box<dyn Any + Send>, location: Option<String>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self { message, location }
    }
}
