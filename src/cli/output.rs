use serde::Serialize;

use crate::cli::OutputFormat;
use crate::core::fragment::FragmentRecord;
use crate::store::StoreError;

/// Serializable view of a fragment for command output
#[derive(Debug, Serialize)]
pub struct FragmentView {
    pub id: String,
    pub primary_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strand: Option<String>,
    pub barcodes: String,
    pub num_barcodes: usize,
    pub group_size: usize,
}

impl From<&FragmentRecord> for FragmentView {
    fn from(record: &FragmentRecord) -> Self {
        Self {
            id: record.id().to_string(),
            primary_key: record.primary_key(),
            location: record.location().map(ToString::to_string),
            strand: record.location().map(|l| l.strand.to_string()),
            barcodes: record.barcodes().to_string(),
            num_barcodes: record.num_barcodes(),
            group_size: record.fragment_group().len(),
        }
    }
}

/// Print every fragment from `fragments`, returning how many were printed.
///
/// Text and TSV stream as they go; JSON is written as one array at the end.
///
/// # Errors
///
/// Returns the first error the cursor yields, or a JSON serialization error.
pub fn print_fragments<I>(fragments: I, format: OutputFormat) -> anyhow::Result<usize>
where
    I: IntoIterator<Item = Result<FragmentRecord, StoreError>>,
{
    let mut printed = 0;
    match format {
        OutputFormat::Text => {
            for fragment in fragments {
                let view = FragmentView::from(&fragment?);
                println!("{}\t{}", view.primary_key, view.barcodes);
                printed += 1;
            }
        }
        OutputFormat::Tsv => {
            println!("id\tprimary_key\tlocation\tstrand\tbarcodes\tnum_barcodes");
            for fragment in fragments {
                let view = FragmentView::from(&fragment?);
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    view.id,
                    view.primary_key,
                    view.location.as_deref().unwrap_or("."),
                    view.strand.as_deref().unwrap_or("."),
                    view.barcodes,
                    view.num_barcodes
                );
                printed += 1;
            }
        }
        OutputFormat::Json => {
            let views = fragments
                .into_iter()
                .map(|fragment| fragment.map(|f| FragmentView::from(&f)))
                .collect::<Result<Vec<_>, _>>()?;
            printed = views.len();
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
    }
    Ok(printed)
}
