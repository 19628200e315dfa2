use thiserror::Error;
use tracing::debug;

use crate::domain::customer::{CustomerId, CustomerRecord};
use crate::domain::{BlobStore, DataAccessError, Entity, LoadError};
use crate::infrastructure::codec::{decode_records, encode_records};

/// 顧客一覧。並び順は登録順のまま表示に使う
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CustomerRepository {
    customers: Vec<CustomerRecord>,
}

impl CustomerRepository {
    pub fn new(customers: Vec<CustomerRecord>) -> Self {
        Self { customers }
    }

    /// ストアから一覧全体を読み込む
    pub fn load<S: BlobStore + ?Sized>(store: &S) -> Result<Self, LoadError> {
        let customers = match store.load_blob(CustomerRecord::ENTITY_NAME)? {
            Some(text) => decode_records(&text)
                .map_err(|e| LoadError::corrupt(CustomerRecord::ENTITY_NAME, e))?,
            None => Vec::new(),
        };
        debug!("顧客データを読み込み: {}件", customers.len());
        Ok(Self::new(customers))
    }

    /// 一覧全体を書き出す
    pub fn persist<S: BlobStore + ?Sized>(&self, store: &mut S) -> Result<(), DataAccessError> {
        let text = encode_records(&self.customers)
            .map_err(|e| DataAccessError::WriteError(Box::new(e)))?;
        store.save_blob(CustomerRecord::ENTITY_NAME, &text)
    }

    pub fn add(&mut self, record: CustomerRecord) -> Result<(), RepositoryError> {
        if self.find_by_id(record.id()).is_some() {
            return Err(RepositoryError::DuplicateId(record.id()));
        }
        self.customers.push(record);
        Ok(())
    }

    /// 該当レコードを書き換える。ID と作成日時はレコード側のAPIで保護されている
    pub fn update<F, T, E>(&mut self, id: CustomerId, mutator: F) -> Result<T, E>
    where
        F: FnOnce(&mut CustomerRecord) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let record = self
            .customers
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or(RepositoryError::NotFound(id))?;
        mutator(record)
    }

    pub fn remove(&mut self, id: CustomerId) -> Result<CustomerRecord, RepositoryError> {
        let index = self
            .customers
            .iter()
            .position(|c| c.id() == id)
            .ok_or(RepositoryError::NotFound(id))?;
        Ok(self.customers.remove(index))
    }

    pub fn find_by_id(&self, id: CustomerId) -> Option<&CustomerRecord> {
        self.customers.iter().find(|c| c.id() == id)
    }

    pub fn query<P>(&self, predicate: P) -> Vec<&CustomerRecord>
    where
        P: Fn(&CustomerRecord) -> bool,
    {
        self.customers.iter().filter(|c| predicate(c)).collect()
    }

    /// 氏名または電話番号の部分一致（大文字小文字を区別しない）
    pub fn search(&self, term: &str) -> Vec<&CustomerRecord> {
        self.query(|c| c.matches(term))
    }

    pub fn replace_all(&mut self, customers: Vec<CustomerRecord>) {
        self.customers = customers;
    }

    pub fn records(&self) -> &[CustomerRecord] {
        &self.customers
    }

    pub fn len(&self) -> usize {
        self.customers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.customers.is_empty()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Customer {0} not found")]
    NotFound(CustomerId),
    #[error("Customer {0} already exists")]
    DuplicateId(CustomerId),
}
