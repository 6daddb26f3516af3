use pkgshelf_core::{
    CatalogStore, ErrorKind, IndexConfig, PackageStore, Repository, SqliteCatalogStore,
    StoreError,
};
use std::path::Path;

type Store = PackageStore<SqliteCatalogStore>;

fn declared_store(root: &Path, indexes: &[(&str, &[&str])]) -> Store {
    let store = PackageStore::new(SqliteCatalogStore::open_in_memory().unwrap());
    let declared = indexes
        .iter()
        .map(|(name, bases)| IndexConfig::new(*name, bases.iter().copied()))
        .collect::<Vec<_>>();
    store.reconcile(root, &declared).unwrap();
    store
}

fn repo<'s>(store: &'s Store, name: &str) -> Repository<'s, SqliteCatalogStore> {
    store.get_repository(name).unwrap().unwrap()
}

/// `(project name, owning repository name)` pairs of the effective project set.
fn effective(store: &Store, repository: &Repository<'_, SqliteCatalogStore>) -> Vec<(String, String)> {
    repository
        .all_projects()
        .unwrap()
        .into_iter()
        .map(|(name, project)| {
            let owner = store
                .catalog()
                .get_repository(project.repository_id())
                .unwrap()
                .unwrap();
            (name, owner.name)
        })
        .collect()
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(project, owner)| (project.to_string(), owner.to_string()))
        .collect()
}

#[test]
fn own_projects_shadow_bases_and_first_base_wins() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(
        dir.path(),
        &[("b1", &[]), ("b2", &[]), ("child", &["b1", "b2"])],
    );
    let b1 = repo(&store, "b1");
    let b2 = repo(&store, "b2");
    let child = repo(&store, "child");

    b1.add_project("shared").unwrap();
    b1.add_project("only-b1").unwrap();
    b2.add_project("shared").unwrap();
    b2.add_project("only-b2").unwrap();
    b2.add_project("mine").unwrap();
    child.add_project("mine").unwrap();

    assert_eq!(
        effective(&store, &child),
        pairs(&[
            ("mine", "child"),
            ("only-b1", "b1"),
            ("only-b2", "b2"),
            ("shared", "b1"),
        ])
    );
}

#[test]
fn base_order_change_changes_the_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(
        dir.path(),
        &[("b1", &[]), ("b2", &[]), ("child", &["b1", "b2"])],
    );
    let b1 = repo(&store, "b1");
    let b2 = repo(&store, "b2");
    let child = repo(&store, "child");
    b1.add_project("shared").unwrap();
    b2.add_project("shared").unwrap();

    child.set_bases(&[b2, b1]).unwrap();

    assert_eq!(effective(&store, &child), pairs(&[("shared", "b2")]));
}

#[test]
fn inherited_projects_resolve_depth_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(
        dir.path(),
        &[
            ("root", &[]),
            ("middle", &["root"]),
            ("side", &[]),
            ("leaf", &["middle", "side"]),
        ],
    );
    repo(&store, "root").add_project("pkg").unwrap();
    repo(&store, "side").add_project("pkg").unwrap();

    // `root` is reached through `middle` before `side` is explored.
    assert_eq!(
        effective(&store, &repo(&store, "leaf")),
        pairs(&[("pkg", "root")])
    );
}

#[test]
fn diamond_shaped_bases_resolve_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(
        dir.path(),
        &[
            ("top", &[]),
            ("left", &["top"]),
            ("right", &["top"]),
            ("bottom", &["left", "right"]),
        ],
    );
    repo(&store, "top").add_project("common").unwrap();
    repo(&store, "right").add_project("extra").unwrap();

    assert_eq!(
        effective(&store, &repo(&store, "bottom")),
        pairs(&[("common", "top"), ("extra", "right")])
    );
}

#[test]
fn base_cycle_is_reported_as_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("a", &[]), ("b", &["a"])]);
    let a = repo(&store, "a");
    let b = repo(&store, "b");

    a.set_bases(&[repo(&store, "b")]).unwrap();

    let err = b.all_projects().unwrap_err();
    assert!(matches!(err, StoreError::BaseCycle { .. }));
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(matches!(a.all_projects(), Err(StoreError::BaseCycle { .. })));
}

#[test]
fn bases_are_read_fresh_on_every_call() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("base", &[]), ("child", &[])]);
    let first_view = repo(&store, "child");
    let second_view = repo(&store, "child");
    assert!(first_view.bases().unwrap().is_empty());

    second_view.set_bases(&[repo(&store, "base")]).unwrap();

    let names = first_view
        .bases()
        .unwrap()
        .iter()
        .map(|base| base.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["base"]);
}

#[test]
fn set_bases_collapses_repeated_entries() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("x", &[]), ("y", &[]), ("child", &[])]);
    let child = repo(&store, "child");

    child
        .set_bases(&[repo(&store, "y"), repo(&store, "x"), repo(&store, "y")])
        .unwrap();

    let names = child
        .bases()
        .unwrap()
        .iter()
        .map(|base| base.name().to_string())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["y", "x"]);
}

#[test]
fn add_project_is_idempotent_and_creates_its_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("main", &[])]);
    let main = repo(&store, "main");

    let first = main.add_project("demo").unwrap();
    let second = main.add_project("demo").unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(first.project_path(), dir.path().join("main").join("demo"));
    assert!(first.project_path().is_dir());
    assert_eq!(store.catalog().list_projects(main.id()).unwrap().len(), 1);
}

#[test]
fn add_project_rejects_unsafe_names() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("main", &[])]);
    let main = repo(&store, "main");

    for name in ["", "..", "a/b"] {
        let err = main.add_project(name).unwrap_err();
        assert!(matches!(err, StoreError::InvalidName(_)), "{name}");
    }
    assert!(main.all_projects().unwrap().is_empty());
}

#[test]
fn add_project_on_a_base_name_creates_an_own_project() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("base", &[]), ("child", &["base"])]);
    let inherited = repo(&store, "base").add_project("demo").unwrap();
    let child = repo(&store, "child");

    let own = child.add_project("demo").unwrap();

    assert_ne!(own.id(), inherited.id());
    assert_eq!(own.repository_id(), child.id());
}

#[test]
fn get_project_never_consults_bases() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("base", &[]), ("child", &["base"])]);
    repo(&store, "base").add_project("demo").unwrap();
    let child = repo(&store, "child");

    assert!(child.get_project("demo").unwrap().is_none());

    let found = child.find_project("demo").unwrap().unwrap();
    assert_eq!(found.repository_id(), repo(&store, "base").id());
    assert!(child.find_project("absent").unwrap().is_none());
}

#[test]
fn repository_accessors_follow_the_storage_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("main", &[])]);
    let main = repo(&store, "main");

    assert_eq!(main.name(), "main");
    assert_eq!(main.storage_root(), dir.path());
    assert_eq!(main.repository_path(), dir.path().join("main"));
    assert!(main.repository_path().is_dir());
}

#[test]
fn own_project_added_later_starts_shadowing_the_base() {
    let dir = tempfile::tempdir().unwrap();
    let store = declared_store(dir.path(), &[("base", &[]), ("child", &["base"])]);
    repo(&store, "base").add_project("p").unwrap();
    let child = repo(&store, "child");
    assert_eq!(effective(&store, &child), pairs(&[("p", "base")]));

    child.add_project("p").unwrap();

    assert_eq!(effective(&store, &child), pairs(&[("p", "child")]));
}
