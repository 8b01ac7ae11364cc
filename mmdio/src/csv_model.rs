use std::io::{Read, Write};

use crate::error::Result;

/// Records of a CSV file, kept as read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvModel {
    pub path: String,
    pub hash: String,
    pub name: String,
    pub records: Vec<Vec<String>>,
}

impl CsvModel {
    pub fn new(records: Vec<Vec<String>>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }

    /// Every row is a record, rows may differ in length.
    pub fn load<R: Read>(reader: R) -> Result<CsvModel> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = vec![];
        for record in reader.records() {
            records.push(record?.iter().map(str::to_owned).collect());
        }
        log::debug!("CSV: {} records", records.len());
        Ok(Self::new(records))
    }

    pub fn load_from_bytes(bytes: &[u8]) -> Result<CsvModel> {
        Self::load(bytes)
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);
        for record in &self.records {
            writer.write_record(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save_to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![];
        self.save(&mut bytes)?;
        Ok(bytes)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[test]
fn test_ragged_records() {
    let text = "Bone,センター,0,1.5\n\"quoted, cell\",x\n\nlast\n";
    let model = CsvModel::load_from_bytes(text.as_bytes()).unwrap();
    assert_eq!(3, model.len());
    assert_eq!(vec!["Bone", "センター", "0", "1.5"], model.records[0]);
    assert_eq!(vec!["quoted, cell", "x"], model.records[1]);
    assert_eq!(vec!["last"], model.records[2]);
    let saved = String::from_utf8(model.save_to_bytes().unwrap()).unwrap();
    assert_eq!("Bone,センター,0,1.5\n\"quoted, cell\",x\nlast\n", saved);
}
