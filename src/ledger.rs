//! 顧客台帳
//!
//! 変更操作はすべてここを通る。各操作は検証、変更、保存、再描画の順に実行され、
//! 保存に失敗した場合はメモリ上の状態を操作前に戻してからエラーを返す。

use chrono::{DateTime, TimeZone};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::domain::customer::{CustomerError, CustomerId, CustomerInput, CustomerRecord, Status};
use crate::domain::membership::{self, PolicyError};
use crate::domain::settings::{Settings, QUOTA_KEY};
use crate::domain::{BlobStore, DataAccessError, Entity, IdGenerator, LoadError};
use crate::infrastructure::codec::{encode_records_pretty, from_json, CodecError, ImportError};
use crate::infrastructure::export::CsvExport;
use crate::infrastructure::repository::{CustomerRepository, RepositoryError};

/// 変更のたびに最新の一覧を受け取る表示側
pub trait Render {
    fn render(&mut self, records: &[CustomerRecord]);
}

impl<F> Render for F
where
    F: FnMut(&[CustomerRecord]),
{
    fn render(&mut self, records: &[CustomerRecord]) {
        self(records)
    }
}

pub struct Ledger<S: BlobStore> {
    store: S,
    customers: CustomerRepository,
    settings: Settings,
    ids: IdGenerator,
    renderer: Option<Box<dyn Render>>,
    csv: CsvExport,
}

impl<S: BlobStore> Ledger<S> {
    /// ストアから設定と顧客一覧を読み込む
    pub fn open(store: S, default_quota: u32) -> Result<Self, LedgerError> {
        let settings = Settings::load(&store, default_quota)?;
        let customers = CustomerRepository::load(&store)?;
        info!(
            "台帳を開きました: 顧客{}件, 年間利用回数{}",
            customers.len(),
            settings.quota()
        );
        Ok(Self {
            store,
            customers,
            settings,
            ids: IdGenerator::default(),
            renderer: None,
            csv: CsvExport::default(),
        })
    }

    pub fn with_renderer(mut self, renderer: impl Render + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_csv_export(mut self, csv: CsvExport) -> Self {
        self.csv = csv;
        self
    }

    /// 新規顧客を登録する。利用回数は現在のクォータ
    pub fn enroll<Tz: TimeZone>(
        &mut self,
        input: CustomerInput,
        now: &DateTime<Tz>,
    ) -> Result<CustomerRecord, LedgerError> {
        let record = CustomerRecord::enroll(self.ids.generate(), input, self.quota(), now)?;
        self.commit(|customers| customers.add(record.clone()).map_err(LedgerError::from))?;
        info!("顧客を登録: {} ({})", record.id(), record.name());
        Ok(record)
    }

    /// 氏名・電話・住所・開始日を変更する。残り回数は変わらない
    pub fn edit_identity(
        &mut self,
        id: CustomerId,
        input: CustomerInput,
    ) -> Result<CustomerRecord, LedgerError> {
        let record = self.commit(|customers| {
            customers.update::<_, _, LedgerError>(id, |record| {
                record.change_identity(input)?;
                Ok(record.clone())
            })
        })?;
        info!("顧客情報を更新: {}", id);
        Ok(record)
    }

    /// 1回分を消費する
    pub fn use_entitlement<Tz: TimeZone>(
        &mut self,
        id: CustomerId,
        now: &DateTime<Tz>,
    ) -> Result<CustomerRecord, LedgerError> {
        let record = self
            .commit(|customers| {
                customers.update::<_, _, LedgerError>(id, |record| {
                    *record = membership::consume(record, now)?;
                    Ok(record.clone())
                })
            })
            .map_err(|e| {
                if let LedgerError::Policy(reason) = &e {
                    warn!("顧客 {} は利用できません: {}", id, reason);
                }
                e
            })?;
        info!(
            "顧客 {} が1回利用しました。残り{}回",
            id,
            record.remaining_uses()
        );
        Ok(record)
    }

    pub fn remove(&mut self, id: CustomerId) -> Result<CustomerRecord, LedgerError> {
        let record = self.commit(|customers| customers.remove(id).map_err(LedgerError::from))?;
        info!("顧客を削除: {} ({})", id, record.name());
        Ok(record)
    }

    /// 今後の登録にのみ適用する。既存顧客の残り回数は変えない
    pub fn set_quota(&mut self, quota: u32) -> Result<(), LedgerError> {
        let previous = self.settings;
        self.settings.set_quota(quota);
        if let Err(e) = self.settings.persist(&mut self.store) {
            error!("{} の保存に失敗したため元に戻します: {}", QUOTA_KEY, e);
            self.settings = previous;
            return Err(e.into());
        }
        info!("年間利用回数を変更: {} -> {}", previous.quota(), quota);
        Ok(())
    }

    /// JSONを読み込み、顧客一覧をすべて置き換える
    pub fn import_json(&mut self, text: &str) -> Result<usize, LedgerError> {
        let imported = from_json(text)?;
        let count = imported.len();
        self.commit(|customers| {
            customers.replace_all(imported);
            Ok(())
        })?;
        info!("顧客データをインポート: {}件", count);
        Ok(count)
    }

    pub fn records(&self) -> &[CustomerRecord] {
        self.customers.records()
    }

    pub fn find(&self, id: CustomerId) -> Option<&CustomerRecord> {
        self.customers.find_by_id(id)
    }

    pub fn search(&self, term: &str) -> Vec<&CustomerRecord> {
        self.customers.search(term)
    }

    pub fn status<Tz: TimeZone>(
        &self,
        id: CustomerId,
        now: &DateTime<Tz>,
    ) -> Result<Status, LedgerError> {
        self.find(id)
            .map(|record| membership::status(record, now))
            .ok_or(LedgerError::NotFound(id))
    }

    pub fn quota(&self) -> u32 {
        self.settings.quota()
    }

    pub fn export_csv<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> String {
        self.csv.render(self.records(), now)
    }

    pub fn export_json(&self) -> Result<String, LedgerError> {
        encode_records_pretty(self.records()).map_err(LedgerError::Export)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// 変更を適用して保存する。失敗時は変更前の一覧に戻す
    fn commit<T, F>(&mut self, change: F) -> Result<T, LedgerError>
    where
        F: FnOnce(&mut CustomerRepository) -> Result<T, LedgerError>,
    {
        let snapshot = self.customers.clone();
        let value = match change(&mut self.customers) {
            Ok(value) => value,
            Err(e) => {
                self.customers = snapshot;
                return Err(e);
            }
        };
        if let Err(e) = self.customers.persist(&mut self.store) {
            error!("顧客データの保存に失敗したため元に戻します: {}", e);
            self.customers = snapshot;
            return Err(e.into());
        }
        debug!("顧客データを保存: {}件", self.customers.len());
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(self.customers.records());
        }
        Ok(value)
    }
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Customer {0} not found")]
    NotFound(CustomerId),
    #[error("Customer {0} already exists")]
    DuplicateId(CustomerId),
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("Invalid customer input: {0}")]
    InvalidInput(CustomerError),
    #[error("Stored data under `{key}` is corrupt: {source}")]
    CorruptState {
        key: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Persistence error: {0}")]
    Persistence(#[from] DataAccessError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error("Export error: {0}")]
    Export(#[source] CodecError),
}

impl From<RepositoryError> for LedgerError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound(id) => Self::NotFound(id),
            RepositoryError::DuplicateId(id) => Self::DuplicateId(id),
        }
    }
}

impl From<CustomerError> for LedgerError {
    fn from(value: CustomerError) -> Self {
        match value {
            CustomerError::Policy(e) => Self::Policy(e),
            e => Self::InvalidInput(e),
        }
    }
}

impl From<LoadError> for LedgerError {
    fn from(value: LoadError) -> Self {
        match value {
            LoadError::Store(e) => Self::Persistence(e),
            LoadError::Corrupt { key, source } => Self::CorruptState { key, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use chrono::{Duration, NaiveDate, Utc};

    use super::*;
    use crate::infrastructure::{codec::encode_records, MemoryBlobStore};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 10, 0, 0).unwrap()
    }

    fn ledger() -> Ledger<MemoryBlobStore> {
        Ledger::open(MemoryBlobStore::new(), 12).unwrap()
    }

    /// 書き込みを失敗させられるストア
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryBlobStore,
        fail_writes: Rc<RefCell<bool>>,
    }

    impl BlobStore for FlakyStore {
        fn load_blob(&self, key: &str) -> Result<Option<String>, DataAccessError> {
            self.inner.load_blob(key)
        }

        fn save_blob(&mut self, key: &str, value: &str) -> Result<(), DataAccessError> {
            if *self.fail_writes.borrow() {
                return Err(DataAccessError::WriteError("disk full".into()));
            }
            self.inner.save_blob(key, value)
        }
    }

    #[test]
    fn test_quota_scenario() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(
                CustomerInput::new("高橋", "03-1111-2222").enrollment_start(date(2024, 1, 10)),
                &at(2024, 1, 10),
            )
            .unwrap();
        assert_eq!(record.enrollment_end(), date(2025, 1, 10));
        assert_eq!(record.remaining_uses(), 12);

        let now = at(2024, 12, 31);
        for left in (0..12).rev() {
            let used = ledger.use_entitlement(record.id(), &now).unwrap();
            assert_eq!(used.remaining_uses(), left);
        }
        assert!(matches!(
            ledger.use_entitlement(record.id(), &now),
            Err(LedgerError::Policy(PolicyError::NoUsesRemaining))
        ));
        assert_eq!(ledger.find(record.id()).unwrap().remaining_uses(), 0);
    }

    #[test]
    fn test_expired_scenario() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(
                CustomerInput::new("伊藤", "06-0000-1111").enrollment_start(date(2023, 1, 1)),
                &at(2023, 1, 1),
            )
            .unwrap();
        assert!(matches!(
            ledger.use_entitlement(record.id(), &at(2024, 6, 1)),
            Err(LedgerError::Policy(PolicyError::MembershipExpired))
        ));
        assert_eq!(ledger.find(record.id()).unwrap().remaining_uses(), 12);
        assert_eq!(
            ledger.status(record.id(), &at(2024, 6, 1)).unwrap(),
            Status::Expired
        );
    }

    #[test]
    fn test_enroll_defaults_start_to_today() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 5, 20))
            .unwrap();
        assert_eq!(record.enrollment_start(), date(2024, 5, 20));
        assert_eq!(record.created_at(), at(2024, 5, 20));
    }

    #[test]
    fn test_enroll_then_search_by_phone() {
        let mut ledger = ledger();
        ledger
            .enroll(CustomerInput::new("Alice", "555-0100"), &at(2024, 1, 1))
            .unwrap();
        let bob = ledger
            .enroll(CustomerInput::new("Bob", "555-0200"), &at(2024, 1, 1))
            .unwrap();
        let found = ledger.search("0200");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0], &bob);
    }

    #[test]
    fn test_enroll_rejects_blank_name() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.enroll(CustomerInput::new("", "1"), &at(2024, 1, 1)),
            Err(LedgerError::InvalidInput(CustomerError::NameIsBlank))
        ));
        assert!(ledger.records().is_empty());
        assert_eq!(ledger.store().load_blob("customers").unwrap(), None);
    }

    #[test]
    fn test_edit_identity_recomputes_end() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(
                CustomerInput::new("渡辺", "1").enrollment_start(date(2024, 1, 10)),
                &at(2024, 1, 10),
            )
            .unwrap();
        ledger.use_entitlement(record.id(), &at(2024, 2, 1)).unwrap();

        let edited = ledger
            .edit_identity(
                record.id(),
                CustomerInput::new("渡辺 健", "2")
                    .address("福岡県")
                    .enrollment_start(date(2024, 3, 1)),
            )
            .unwrap();
        assert_eq!(edited.id(), record.id());
        assert_eq!(edited.name(), "渡辺 健");
        assert_eq!(edited.enrollment_end(), date(2025, 3, 1));
        assert_eq!(edited.remaining_uses(), 11);
        assert_eq!(edited.created_at(), record.created_at());
        assert!(matches!(
            ledger.edit_identity(CustomerId::from(1u64), CustomerInput::new("x", "y")),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_unknown_leaves_collection() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 1, 1))
            .unwrap();
        let before = ledger.records().to_vec();
        assert!(matches!(
            ledger.remove(CustomerId::from(0u64)),
            Err(LedgerError::NotFound(_))
        ));
        assert_eq!(ledger.records(), &before[..]);

        ledger.remove(record.id()).unwrap();
        assert!(ledger.records().is_empty());
        assert!(matches!(
            ledger.remove(record.id()),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn test_quota_is_not_retroactive() {
        let mut ledger = ledger();
        let old = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 1, 1))
            .unwrap();
        ledger.set_quota(24).unwrap();
        let new = ledger
            .enroll(CustomerInput::new("b", "2"), &at(2024, 1, 2))
            .unwrap();
        assert_eq!(ledger.find(old.id()).unwrap().remaining_uses(), 12);
        assert_eq!(new.remaining_uses(), 24);
    }

    #[test]
    fn test_reopen_restores_state() {
        let mut ledger = ledger();
        ledger.set_quota(6).unwrap();
        let record = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 1, 1))
            .unwrap();
        ledger.use_entitlement(record.id(), &at(2024, 1, 2)).unwrap();

        let reopened = Ledger::open(ledger.into_store(), 12).unwrap();
        assert_eq!(reopened.quota(), 6);
        assert_eq!(reopened.records().len(), 1);
        assert_eq!(reopened.find(record.id()).unwrap().remaining_uses(), 5);
    }

    #[test]
    fn test_open_corrupt_store() {
        let mut store = MemoryBlobStore::new();
        store.save_blob("customers", "not json").unwrap();
        assert!(matches!(
            Ledger::open(store, 12),
            Err(LedgerError::CorruptState {
                key: "customers",
                ..
            })
        ));
    }

    #[test]
    fn test_write_failure_rolls_back() {
        let fail_writes = Rc::new(RefCell::new(false));
        let store = FlakyStore {
            fail_writes: fail_writes.clone(),
            ..Default::default()
        };
        let mut ledger = Ledger::open(store, 12).unwrap();
        let record = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 1, 1))
            .unwrap();

        *fail_writes.borrow_mut() = true;
        assert!(matches!(
            ledger.use_entitlement(record.id(), &at(2024, 1, 2)),
            Err(LedgerError::Persistence(_))
        ));
        assert_eq!(ledger.find(record.id()).unwrap().remaining_uses(), 12);
        assert!(matches!(
            ledger.enroll(CustomerInput::new("b", "2"), &at(2024, 1, 2)),
            Err(LedgerError::Persistence(_))
        ));
        assert_eq!(ledger.records().len(), 1);
        assert!(matches!(ledger.set_quota(3), Err(LedgerError::Persistence(_))));
        assert_eq!(ledger.quota(), 12);

        *fail_writes.borrow_mut() = false;
        let reopened = Ledger::open(ledger.into_store(), 12).unwrap();
        assert_eq!(reopened.records(), &[record][..]);
    }

    #[test]
    fn test_renderer_sees_each_mutation() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut ledger = ledger().with_renderer(move |records: &[CustomerRecord]| {
            sink.borrow_mut().push(records.len())
        });
        let record = ledger
            .enroll(CustomerInput::new("a", "1"), &at(2024, 1, 1))
            .unwrap();
        ledger.use_entitlement(record.id(), &at(2024, 1, 2)).unwrap();
        let _ = ledger.remove(CustomerId::from(0u64));
        ledger.remove(record.id()).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 1, 0]);
    }

    #[test]
    fn test_import_overwrites() {
        let mut ledger = ledger();
        ledger
            .enroll(CustomerInput::new("old", "1"), &at(2024, 1, 1))
            .unwrap();

        let now = at(2024, 2, 1);
        let incoming = vec![
            CustomerRecord::enroll(100u64.into(), CustomerInput::new("x", "10"), 5, &now).unwrap(),
            CustomerRecord::enroll(101u64.into(), CustomerInput::new("y", "11"), 5, &now).unwrap(),
        ];
        let count = ledger
            .import_json(&encode_records(&incoming).unwrap())
            .unwrap();
        assert_eq!(count, 2);
        assert_eq!(ledger.records(), &incoming[..]);

        assert!(matches!(ledger.import_json("[{]"), Err(LedgerError::Import(_))));
        assert_eq!(ledger.records(), &incoming[..]);
    }

    #[test]
    fn test_export() {
        let mut ledger = ledger();
        let record = ledger
            .enroll(
                CustomerInput::new("a", "1").enrollment_start(date(2024, 1, 10)),
                &at(2024, 1, 10),
            )
            .unwrap();
        let csv = ledger.export_csv(&(at(2025, 1, 10) + Duration::days(1)));
        assert!(csv.ends_with(",2024/1/10,2025/1/10,12,Expired\n"));
        let json = ledger.export_json().unwrap();
        assert_eq!(from_json(&json).unwrap(), vec![record]);
    }
}
