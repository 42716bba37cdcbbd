use std::{
    collections::HashMap,
    ffi::OsStr,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use cadence_core::{CoreError, EmployeeRecord, ObligationStore, PayrollSource};
use cadence_domain::{
    Frequency, JobDefinition, JobState, Obligation, ObligationKind, LEGACY_PAYROLL_CHECKER,
};
use cadence_scheduler::{
    CommandOutput, CommandRunner, CronLifecycleManager, CrontabBackend, DeleteOutcome,
    InProcessScheduler, JobBackend, RegistryBackend, Scheduler,
};
use cadence_storage_json::{JsonJobRegistry, PayrollChecker, RegistryPaths};
use chrono::NaiveDate;
use regex::Regex;
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct MapStore(Mutex<HashMap<String, String>>);

impl MapStore {
    fn link(&self, job_id: &str, unique_id: &str) {
        self.0
            .lock()
            .unwrap()
            .insert(job_id.to_string(), unique_id.to_string());
    }
}

impl ObligationStore for MapStore {
    fn unique_id_for(&self, job_id: &str) -> Result<Option<String>, CoreError> {
        Ok(self.0.lock().unwrap().get(job_id).cloned())
    }
}

struct Fixture {
    dir: TempDir,
    scheduler: Arc<InProcessScheduler>,
    registry: JsonJobRegistry,
    store: Arc<MapStore>,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempdir().expect("tempdir");
        let registry = JsonJobRegistry::new(RegistryPaths::beside(dir.path().join("jobs.json")))
            .with_lock_timeout(Duration::from_secs(10));
        Self {
            dir,
            scheduler: Arc::new(InProcessScheduler::default()),
            registry,
            store: Arc::new(MapStore::default()),
        }
    }

    fn scripts_dir(&self) -> PathBuf {
        self.dir.path().join("scripts")
    }

    fn backend(&self) -> RegistryBackend {
        RegistryBackend::new(self.scheduler.clone(), self.registry.clone())
    }

    fn manager(&self) -> CronLifecycleManager {
        CronLifecycleManager::new(self.backend(), self.store.clone(), self.scripts_dir())
    }

    fn registry_names(&self) -> Vec<String> {
        let registry = self.registry.load().expect("load registry");
        registry.names().map(str::to_string).collect()
    }
}

struct Employees(Vec<&'static str>);

impl PayrollSource for Employees {
    fn employees(&self) -> Result<Vec<EmployeeRecord>, CoreError> {
        Ok(self.0.iter().map(|id| EmployeeRecord::new(*id)).collect())
    }
}

fn payroll_checker() -> PayrollChecker {
    PayrollChecker::new(PathBuf::from("/jobs/payroll-checker.js"))
}

fn obligation(frequency: Frequency) -> Obligation {
    let begin = NaiveDate::from_ymd_opt(2021, 7, 19)
        .unwrap()
        .and_hms_opt(13, 30, 0)
        .unwrap();
    Obligation::new(ObligationKind::Expense, "Gym", 30.0, begin, frequency)
}

#[test]
fn schedule_then_delete_leaves_nothing_behind() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let scheduled = manager.schedule(&obligation(Frequency::Monthly)).expect("schedule");
    let id_format = Regex::new(r"^expense-[0-9a-f]{8}(-[0-9a-f]{4}){3}-[0-9a-f]{12}$").unwrap();
    assert!(id_format.is_match(&scheduled.unique_id), "{}", scheduled.unique_id);
    assert_eq!(scheduled.state, JobState::Active);

    let script = manager.script_path(&scheduled.unique_id);
    assert!(script.exists());
    assert_eq!(fs::read(&script).unwrap(), Vec::<u8>::new());
    assert!(fixture.scheduler.contains(&scheduled.unique_id).unwrap());
    assert_eq!(fixture.registry_names(), vec![scheduled.unique_id.clone()]);

    let persisted = fixture.registry.load().unwrap();
    let job = persisted.get(&scheduled.unique_id).unwrap();
    assert_eq!(job.cron, "30 13 19 */1 *");
    assert_eq!(job.script_path, script);
    let payload = &job.worker.as_ref().expect("worker payload").worker_data;
    assert_eq!(payload["title"], "Gym");

    fixture.store.link("job-1", &scheduled.unique_id);
    let outcome = manager.delete("job-1").expect("delete");
    assert_eq!(outcome, DeleteOutcome::Deleted(scheduled.unique_id.clone()));
    assert!(!script.exists());
    assert!(!fixture.scheduler.contains(&scheduled.unique_id).unwrap());
    assert!(fixture.registry_names().is_empty());
    assert_eq!(manager.delete("job-1").expect("second delete"), DeleteOutcome::NotFound);
}

#[test]
fn cron_expressions_follow_frequency() {
    let fixture = Fixture::new();
    let manager = fixture.manager();

    let monthly = manager.schedule(&obligation(Frequency::Monthly)).unwrap();
    assert_eq!(monthly.cron_expression, "30 13 19 */1 *");

    let custom = manager
        .schedule(&obligation(Frequency::Custom).with_interval(2))
        .unwrap();
    assert_eq!(custom.cron_expression, "30 13 */72 * *");
    assert!(fixture.scheduler.contains(&custom.unique_id).unwrap());
    assert_eq!(fixture.scheduler.next_fire(&custom.unique_id).unwrap(), None);
}

#[test]
fn delete_of_unknown_job_id_touches_nothing() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    manager.schedule(&obligation(Frequency::Monthly)).unwrap();
    let before = fs::read(fixture.registry.path()).unwrap();

    assert_eq!(manager.delete("missing").unwrap(), DeleteOutcome::NotFound);
    assert_eq!(fs::read(fixture.registry.path()).unwrap(), before);
}

#[test]
fn delete_of_inactive_unique_id_is_not_found() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    fixture.store.link("job-1", "expense-gone");

    assert_eq!(manager.delete("job-1").unwrap(), DeleteOutcome::NotFound);
    assert!(!fixture.registry.path().exists());
}

#[test]
fn not_found_delete_leaves_legacy_entry_and_file_untouched() {
    let fixture = Fixture::new();
    let jobs = vec![
        JobDefinition::new(LEGACY_PAYROLL_CHECKER, "0 0 1 */1 *", PathBuf::from("p.js")),
        JobDefinition::new("loan-b", "0 9 1 */1 *", PathBuf::from("b")),
    ];
    fixture.registry.save(&jobs).unwrap();
    let before = fs::read(fixture.registry.path()).unwrap();
    let manager = fixture.manager();
    fixture.store.link("job-1", "expense-gone");

    assert_eq!(manager.delete("job-1").unwrap(), DeleteOutcome::NotFound);
    assert_eq!(fs::read(fixture.registry.path()).unwrap(), before);
}

#[test]
fn delete_of_job_only_in_live_scheduler_prunes_legacy_entry() {
    let fixture = Fixture::new();
    let legacy = JobDefinition::new(LEGACY_PAYROLL_CHECKER, "0 0 1 */1 *", PathBuf::from("p.js"));
    fixture.registry.save(&[legacy]).unwrap();
    let live = JobDefinition::new("expense-live", "30 13 19 */1 *", PathBuf::from("a"));
    fixture.scheduler.register(&live).unwrap();
    fixture.store.link("job-1", "expense-live");

    let outcome = fixture.manager().delete("job-1").unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted("expense-live".to_string()));
    assert!(!fixture.scheduler.contains("expense-live").unwrap());
    assert!(fixture.registry_names().is_empty());
}

#[test]
fn delete_succeeds_when_script_artifact_cannot_be_removed() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let scheduled = manager.schedule(&obligation(Frequency::Monthly)).unwrap();
    let script = manager.script_path(&scheduled.unique_id);
    fs::remove_file(&script).unwrap();
    fs::create_dir_all(script.join("pinned")).unwrap();
    fixture.store.link("job-1", &scheduled.unique_id);

    let outcome = manager.delete("job-1").unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted(scheduled.unique_id.clone()));
    assert!(!fixture.scheduler.contains(&scheduled.unique_id).unwrap());
    assert!(fixture.registry_names().is_empty());
    assert!(script.exists());
}

#[test]
fn invalid_obligation_is_rejected_before_any_side_effect() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let broken = obligation(Frequency::Weekly).with_day_of_week(9);

    assert!(matches!(manager.schedule(&broken), Err(CoreError::Validation(_))));
    assert!(!fixture.scripts_dir().exists());
    assert!(fixture.scheduler.list().unwrap().is_empty());
}

#[test]
fn failed_activation_rolls_back_script_and_registration() {
    let fixture = Fixture::new();
    let registry = fixture.registry.clone().with_lock_timeout(Duration::from_millis(50));
    let backend = RegistryBackend::new(fixture.scheduler.clone(), registry.clone());
    let manager = CronLifecycleManager::new(backend, fixture.store.clone(), fixture.scripts_dir());

    let _held = registry.lock().expect("hold lock");
    let result = manager.schedule(&obligation(Frequency::Monthly));

    assert!(matches!(result, Err(CoreError::LockTimeout { .. })));
    assert!(fixture.scheduler.list().unwrap().is_empty());
    let leftovers = fs::read_dir(fixture.scripts_dir()).unwrap().count();
    assert_eq!(leftovers, 0);
}

#[test]
fn delete_prunes_legacy_payroll_checker() {
    let fixture = Fixture::new();
    let legacy = JobDefinition::new(LEGACY_PAYROLL_CHECKER, "0 0 1 */1 *", PathBuf::from("p.js"));
    fixture.registry.save(&[legacy]).unwrap();
    let manager = fixture.manager();

    let scheduled = manager.schedule(&obligation(Frequency::Monthly)).unwrap();
    fixture.store.link("job-1", &scheduled.unique_id);
    manager.delete("job-1").unwrap();

    assert!(fixture.registry_names().is_empty());
}

#[test]
fn legacy_pruning_can_be_disabled() {
    let fixture = Fixture::new();
    let legacy = JobDefinition::new(LEGACY_PAYROLL_CHECKER, "0 0 1 */1 *", PathBuf::from("p.js"));
    fixture.registry.save(&[legacy]).unwrap();
    let backend = fixture.backend().with_legacy_pruning(false);
    let manager = CronLifecycleManager::new(backend, fixture.store.clone(), fixture.scripts_dir());

    let scheduled = manager.schedule(&obligation(Frequency::Monthly)).unwrap();
    fixture.store.link("job-1", &scheduled.unique_id);
    manager.delete("job-1").unwrap();

    assert_eq!(fixture.registry_names(), vec![LEGACY_PAYROLL_CHECKER.to_string()]);
}

#[test]
fn restore_registers_persisted_jobs() {
    let fixture = Fixture::new();
    let jobs = vec![
        JobDefinition::new("expense-a", "30 13 19 */1 *", PathBuf::from("a")),
        JobDefinition::new("loan-b", "0 9 1 */1 *", PathBuf::from("b")),
    ];
    fixture.registry.save(&jobs).unwrap();

    let restored = fixture.backend().restore().unwrap();
    assert_eq!(restored, 2);
    assert_eq!(fixture.scheduler.list().unwrap(), jobs);
}

#[test]
fn concurrent_schedules_and_deletes_keep_registry_consistent() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    // A second manager with its own live scheduler stands in for another process.
    let other = CronLifecycleManager::new(
        RegistryBackend::new(Arc::new(InProcessScheduler::default()), fixture.registry.clone()),
        fixture.store.clone(),
        fixture.scripts_dir(),
    );

    let kept: Vec<String> = thread::scope(|scope| {
        let handles: Vec<_> = (0..6)
            .map(|worker| {
                let manager = if worker % 2 == 0 { &manager } else { &other };
                let store = &fixture.store;
                scope.spawn(move || {
                    let mut kept = Vec::new();
                    for round in 0..4 {
                        let scheduled = manager.schedule(&obligation(Frequency::Monthly)).unwrap();
                        if round % 2 == 0 {
                            let job_id = format!("{worker}-{round}");
                            store.link(&job_id, &scheduled.unique_id);
                            let outcome = manager.delete(&job_id).unwrap();
                            assert_eq!(outcome.unique_id(), Some(scheduled.unique_id.as_str()));
                        } else {
                            kept.push(scheduled.unique_id);
                        }
                    }
                    kept
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect()
    });

    let mut names = fixture.registry_names();
    let mut expected = kept;
    names.sort();
    expected.sort();
    assert_eq!(names.len(), 12);
    assert_eq!(names, expected);
}

#[test]
fn payroll_sync_replaces_checkers_in_scheduler_and_registry() {
    let fixture = Fixture::new();
    let manager = fixture.manager();
    let kept = manager.schedule(&obligation(Frequency::Monthly)).unwrap();

    let active = manager
        .sync_payroll_checkers(&Employees(vec!["1", "2"]), &payroll_checker())
        .unwrap();
    assert_eq!(active, 2);
    let active = manager
        .sync_payroll_checkers(&Employees(vec!["2"]), &payroll_checker())
        .unwrap();
    assert_eq!(active, 1);

    let live: Vec<String> = fixture
        .scheduler
        .list()
        .unwrap()
        .into_iter()
        .map(|job| job.name)
        .collect();
    let expected = vec![kept.unique_id.clone(), "payroll-checker-employee-2".to_string()];
    assert_eq!(live, expected);
    assert_eq!(fixture.registry_names(), expected);
}

#[test]
fn concurrent_payroll_syncs_leave_scheduler_matching_registry() {
    let fixture = Fixture::new();
    let first = fixture.manager();
    let second = fixture.manager();

    thread::scope(|scope| {
        for (manager, employees) in [(&first, vec!["1", "2", "3"]), (&second, vec!["4"])] {
            scope.spawn(move || {
                let source = Employees(employees);
                for _ in 0..10 {
                    manager.sync_payroll_checkers(&source, &payroll_checker()).unwrap();
                }
            });
        }
    });

    let mut live: Vec<String> = fixture
        .scheduler
        .list()
        .unwrap()
        .into_iter()
        .filter(|job| job.is_payroll_checker())
        .map(|job| job.name)
        .collect();
    let mut persisted = fixture.registry_names();
    live.sort();
    persisted.sort();
    assert!(!live.is_empty());
    assert_eq!(live, persisted);
}

/// Keeps an in-memory crontab and answers `crontab -l` / `crontab <file>`.
#[derive(Default)]
struct FakeCrontab {
    content: Mutex<Option<String>>,
    reject_install: bool,
    installs: Mutex<usize>,
}

impl FakeCrontab {
    fn rejecting() -> Self {
        Self {
            reject_install: true,
            ..Self::default()
        }
    }

    fn content(&self) -> Option<String> {
        self.content.lock().unwrap().clone()
    }
}

impl CommandRunner for FakeCrontab {
    fn run(&self, program: &str, args: &[&OsStr]) -> io::Result<CommandOutput> {
        assert_eq!(program, "crontab");
        if args == [OsStr::new("-l")] {
            return Ok(match self.content() {
                Some(stdout) => CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout,
                    stderr: String::new(),
                },
                None => CommandOutput {
                    success: false,
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "no crontab for tester\n".to_string(),
                },
            });
        }
        *self.installs.lock().unwrap() += 1;
        if self.reject_install {
            return Ok(CommandOutput {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: "bad minute\n".to_string(),
            });
        }
        let staged = fs::read_to_string(Path::new(args[0]))?;
        *self.content.lock().unwrap() = Some(staged);
        Ok(CommandOutput {
            success: true,
            code: Some(0),
            ..CommandOutput::default()
        })
    }
}

fn crontab_in(dir: &TempDir, runner: FakeCrontab) -> CrontabBackend<FakeCrontab> {
    CrontabBackend::new(runner, dir.path().join("crontab.lock"), "node")
        .with_staging_dir(dir.path().to_path_buf())
}

#[test]
fn crontab_backend_appends_and_filters_entries() {
    let dir = tempdir().unwrap();
    let backend = crontab_in(&dir, FakeCrontab::default());
    let first = JobDefinition::new("expense-a", "30 13 19 */1 *", PathBuf::from("/jobs/expense-a"));
    let second = JobDefinition::new("loan-b", "0 9 1 */1 *", PathBuf::from("/jobs/loan-b"));

    backend.activate(&first).unwrap();
    backend.activate(&second).unwrap();
    assert_eq!(
        backend.runner().content().unwrap(),
        "30 13 19 */1 * node /jobs/expense-a # expense-a\n0 9 1 */1 * node /jobs/loan-b # loan-b\n"
    );

    assert!(backend.deactivate("expense-a").unwrap());
    assert_eq!(
        backend.runner().content().unwrap(),
        "0 9 1 */1 * node /jobs/loan-b # loan-b\n"
    );
    assert!(!dir.path().join("crontab.lock").exists());
}

#[test]
fn crontab_backend_skips_install_when_nothing_matches() {
    let dir = tempdir().unwrap();
    let backend = crontab_in(&dir, FakeCrontab::default());

    assert!(!backend.deactivate("expense-missing").unwrap());
    assert_eq!(*backend.runner().installs.lock().unwrap(), 0);
}

#[test]
fn crontab_install_failure_is_reported_and_releases_lock() {
    let dir = tempdir().unwrap();
    let backend = crontab_in(&dir, FakeCrontab::rejecting());
    let job = JobDefinition::new("expense-a", "30 13 19 */1 *", PathBuf::from("/jobs/expense-a"));

    let err = backend.activate(&job).unwrap_err();
    assert!(
        matches!(err, CoreError::ExternalProcess(ref message) if message.contains("bad minute"))
    );
    assert!(!dir.path().join("crontab.lock").exists());
    let staged_left = fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(staged_left, 0);
}

#[test]
fn crontab_lock_held_elsewhere_times_out() {
    let dir = tempdir().unwrap();
    let backend = crontab_in(&dir, FakeCrontab::default())
        .with_lock_timeout(Duration::from_millis(50));
    fs::write(dir.path().join("crontab.lock"), "1").unwrap();

    let job = JobDefinition::new("expense-a", "30 13 19 */1 *", PathBuf::from("/jobs/expense-a"));
    assert!(matches!(backend.activate(&job), Err(CoreError::LockTimeout { .. })));
    assert_eq!(*backend.runner().installs.lock().unwrap(), 0);
}

#[test]
fn crontab_payroll_sync_replaces_only_checker_lines() {
    let dir = tempdir().unwrap();
    let backend = crontab_in(&dir, FakeCrontab::default());
    let job = JobDefinition::new("expense-a", "30 13 19 */1 *", PathBuf::from("/jobs/expense-a"));
    backend.activate(&job).unwrap();

    let checker = payroll_checker();
    assert_eq!(backend.sync_payroll_checkers(&Employees(vec!["1", "2"]), &checker).unwrap(), 2);
    assert_eq!(backend.sync_payroll_checkers(&Employees(vec!["2"]), &checker).unwrap(), 1);
    assert_eq!(
        backend.runner().content().unwrap(),
        "30 13 19 */1 * node /jobs/expense-a # expense-a\n\
         0 0 1 */1 * node /jobs/payroll-checker.js # payroll-checker-employee-2\n"
    );
    assert!(!dir.path().join("crontab.lock").exists());
}

#[test]
fn lifecycle_over_crontab_backend() {
    let dir = tempdir().unwrap();
    let store = Arc::new(MapStore::default());
    let scripts = dir.path().join("scripts");
    let manager = CronLifecycleManager::new(
        crontab_in(&dir, FakeCrontab::default()),
        store.clone(),
        scripts.clone(),
    );

    let scheduled = manager.schedule(&obligation(Frequency::Yearly)).unwrap();
    assert_eq!(scheduled.cron_expression, "30 13 19 7 *");
    store.link("job-9", &scheduled.unique_id);

    let outcome = manager.delete("job-9").unwrap();
    assert_eq!(outcome, DeleteOutcome::Deleted(scheduled.unique_id.clone()));
    assert_eq!(manager.delete("job-9").unwrap(), DeleteOutcome::NotFound);
    assert_eq!(fs::read_dir(&scripts).unwrap().count(), 0);
}
