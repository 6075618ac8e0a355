use stackform_core::{Action, ConvergeOptions, CoreError, Deployer, Event, Outcome, PollSettings};
use stackform_provider::{MockCall, MockCloud, Phase, StackOperation, StackStatus};
use stackform_schema::{parse_manifest_str, RegionName};
use std::fs;
use std::path::{Path, PathBuf};

const STORAGE: &str = r#"
name = "storage"
region = "us-f12g"

[[volumes]]
name = "data"
zone = "us-f12ga"
size = 100
count = 2
replicas = ["1", "2"]

[[servers]]
image = { image_name = "default" }
role = "db"
attachments = [{ volume = "data", mount_point = "/data", device = "/dev/sdf" }]
"#;

fn cloud() -> MockCloud {
    let cloud = MockCloud::new(["us-f12g", "us-manassas"]);
    cloud.add_image("us-f12g", "ami-100", "default").unwrap();
    cloud
}

fn deployer(cloud: &MockCloud) -> Deployer<MockCloud> {
    Deployer::new(cloud.clone()).with_poll(PollSettings::immediate())
}

fn write_definition(dir: &Path, content: &str) -> PathBuf {
    let path = dir.join("stack.toml");
    fs::write(&path, content).unwrap();
    path
}

fn statuses(events: &[Event]) -> Vec<StackStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Status { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

#[test]
fn scenario_a_absent_stack_is_created_and_polled() {
    let cloud = cloud();
    let dir = tempfile::tempdir().unwrap();
    write_definition(dir.path(), STORAGE);

    let mut events = Vec::new();
    let report = deployer(&cloud)
        .apply(
            dir.path(),
            None,
            ConvergeOptions::default(),
            &mut |e: &Event| events.push(e.clone()),
        )
        .unwrap();

    assert_eq!(report.stack, "storage");
    assert_eq!(report.region, "us-f12g");
    assert_eq!(
        report.outcome,
        Outcome::Converged {
            action: Action::Create,
            status: StackStatus::CREATE_COMPLETE
        }
    );
    assert_eq!(
        statuses(&events),
        vec![StackStatus::CREATE_IN_PROGRESS, StackStatus::CREATE_COMPLETE]
    );
    assert_eq!(
        cloud.mutations(),
        vec![MockCall::CreateStack {
            region: "us-f12g".to_owned(),
            stack: "storage".to_owned()
        }]
    );

    let document = cloud.document("us-f12g", "storage").unwrap();
    assert!(document.contains("\"ImageId\": \"ami-100\""));
    assert!(document.contains("\"dataR2N2\""));
}

#[test]
fn scenario_b_changed_stack_is_updated() {
    let cloud = cloud();
    let d = deployer(&cloud);
    let first = parse_manifest_str(STORAGE).unwrap();
    d.apply_manifest(&first, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();

    let changed = parse_manifest_str(&STORAGE.replace("size = 100", "size = 200")).unwrap();
    let mut events = Vec::new();
    let report = d
        .apply_manifest(
            &changed,
            None,
            ConvergeOptions::default(),
            &mut |e: &Event| events.push(e.clone()),
        )
        .unwrap();
    assert_eq!(
        report.outcome,
        Outcome::Converged {
            action: Action::Update,
            status: StackStatus::UPDATE_COMPLETE
        }
    );
    assert_eq!(
        statuses(&events),
        vec![StackStatus::UPDATE_IN_PROGRESS, StackStatus::UPDATE_COMPLETE]
    );
}

#[test]
fn unchanged_definition_takes_no_updates_path() {
    let cloud = cloud();
    let d = deployer(&cloud);
    let m = parse_manifest_str(STORAGE).unwrap();
    let first = d
        .apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();
    let calls_before = cloud.calls().len();

    let second = d
        .apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();
    assert_eq!(second.outcome, Outcome::Unchanged);
    assert_eq!(first.digest, second.digest);
    assert!(!cloud.calls()[calls_before..]
        .iter()
        .any(|c| matches!(c, MockCall::StackStatus { .. })));
}

#[test]
fn scenario_c_create_only_fails_fast_on_existing_stack() {
    let cloud = cloud();
    cloud
        .seed_stack("us-f12g", "storage", r#"{"Resources": {}}"#)
        .unwrap();
    let m = parse_manifest_str(STORAGE).unwrap();
    let err = deployer(&cloud)
        .apply_manifest(
            &m,
            None,
            ConvergeOptions { create_only: true },
            &mut |_: &Event| {},
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::CreateOnly(_)));
    assert!(err.to_string().starts_with("configuration error"));
    assert!(cloud.mutations().is_empty());
}

#[test]
fn scenario_d_name_in_two_regions_is_ambiguous() {
    let cloud = cloud();
    cloud
        .seed_stack("us-f12g", "inall", r#"{"Resources": {}}"#)
        .unwrap();
    cloud
        .seed_stack("us-manassas", "inall", r#"{"Resources": {}}"#)
        .unwrap();
    let err = stackform_core::find(&cloud, "inall", None).unwrap_err();
    assert!(matches!(err, CoreError::AmbiguousStack { ref regions, .. } if regions.len() == 2));

    let handle = stackform_core::find(&cloud, "inall", Some(&RegionName::from("us-manassas")))
        .unwrap()
        .unwrap();
    assert_eq!(handle.region, "us-manassas");
}

#[test]
fn scenario_e_inconsistent_attachments_fail_before_any_call() {
    let input = r#"
name = "mixed"
region = "us-f12g"

[[volumes]]
name = "a"
zone = "us-f12ga"
size = 1
replicas = ["1", "2"]

[[volumes]]
name = "b"
zone = "us-f12ga"
size = 1
replicas = ["1"]

[[servers]]
image = { image_name = "default" }
attachments = [
  { volume = "a", mount_point = "/a", device = "/dev/sdf" },
  { volume = "b", mount_point = "/b", device = "/dev/sdg" },
]
"#;
    let cloud = cloud();
    let m = parse_manifest_str(input).unwrap();
    let err = deployer(&cloud)
        .apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap_err();
    assert!(err.to_string().starts_with("stack definition error"));
    assert!(err.to_string().contains("inconsistent attachments"));
    assert!(cloud.calls().is_empty());
}

#[test]
fn scenario_f_rollback_after_update_is_a_convergence_failure() {
    let cloud = cloud();
    let d = deployer(&cloud);
    let m = parse_manifest_str(STORAGE).unwrap();
    d.apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();

    let rollback = StackStatus::new(StackOperation::Rollback, Phase::Complete);
    cloud
        .script_statuses(
            "us-f12g",
            "storage",
            [
                StackStatus::UPDATE_IN_PROGRESS,
                StackStatus::UPDATE_IN_PROGRESS,
                rollback,
            ],
        )
        .unwrap();

    let changed = parse_manifest_str(&STORAGE.replace("role = \"db\"", "role = \"cache\"")).unwrap();
    let err = d
        .apply_manifest(&changed, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap_err();
    assert!(matches!(err, CoreError::ConvergenceFailed { actual, .. } if actual == rollback));
    assert!(err.to_string().contains("ROLLBACK_COMPLETE"));
}

#[test]
fn reapplying_after_rollback_submits_the_update_again() {
    let cloud = cloud();
    let d = deployer(&cloud);
    let m = parse_manifest_str(STORAGE).unwrap();
    d.apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();
    let accepted = cloud.document("us-f12g", "storage").unwrap();

    cloud
        .script_statuses(
            "us-f12g",
            "storage",
            [
                StackStatus::UPDATE_IN_PROGRESS,
                StackStatus::new(StackOperation::UpdateRollback, Phase::Complete),
            ],
        )
        .unwrap();
    let changed = parse_manifest_str(&STORAGE.replace("size = 100", "size = 300")).unwrap();
    assert!(d
        .apply_manifest(&changed, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .is_err());
    assert_eq!(cloud.document("us-f12g", "storage").unwrap(), accepted);

    let again = d
        .apply_manifest(&changed, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();
    assert_eq!(
        again.outcome,
        Outcome::Converged {
            action: Action::Update,
            status: StackStatus::UPDATE_COMPLETE
        }
    );
}

#[test]
fn region_falls_back_to_default_then_errors() {
    let cloud = cloud();
    let m = parse_manifest_str("name = \"bare\"\n").unwrap();

    let err = deployer(&cloud)
        .apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap_err();
    assert!(matches!(err, CoreError::NoRegion(_)));

    let report = deployer(&cloud)
        .with_default_region(Some(RegionName::from("us-manassas")))
        .apply_manifest(&m, None, ConvergeOptions::default(), &mut |_: &Event| {})
        .unwrap();
    assert_eq!(report.region, "us-manassas");
}

#[test]
fn subnet_lookup_resolves_cross_stack_reference() {
    let cloud = cloud();
    cloud
        .seed_stack(
            "us-f12g",
            "network",
            r#"{"Resources": {"PrivateSubnet": {"Type": "AWS::EC2::Subnet"}}}"#,
        )
        .unwrap();
    let input = STORAGE.replace(
        "role = \"db\"",
        "role = \"db\"\nsubnet = { stack = \"network\", resource = \"PrivateSubnet\" }",
    );
    let m = parse_manifest_str(&input).unwrap();
    let rendered = deployer(&cloud).render(&m, None).unwrap();
    assert!(rendered.document.contains("\"SubnetId\": \"subnet-"));
    assert!(cloud.mutations().is_empty());
}

#[test]
fn teardown_processes_stacks_in_order_and_stops_at_first_failure() {
    let cloud = cloud();
    let doc = r#"{"Resources": {}}"#;
    cloud.seed_stack("us-f12g", "one", doc).unwrap();
    cloud.seed_stack("us-manassas", "three", doc).unwrap();

    let names = vec!["one".to_owned(), "two".to_owned(), "three".to_owned()];
    let (reports, result) = deployer(&cloud).destroy_all(&names, None, &mut |_: &Event| {});
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].stack, "one");
    assert_eq!(reports[0].status, StackStatus::DELETE_COMPLETE);
    assert!(matches!(result, Err(CoreError::StackNotFound(ref s)) if s == "two"));

    // "three" was never touched.
    assert!(cloud.document("us-manassas", "three").is_some());
    assert_eq!(cloud.mutations().len(), 1);
}
