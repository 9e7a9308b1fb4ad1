//! Delimited file source tests

use std::io::Write;
use tempfile::NamedTempFile;
use voterspheres_ingest::{DelimitedFileSource, SourceError};

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_reads_rows_with_optional_columns() {
    let file = write_file(
        "Name,Office,State,District,Party,Year,Website\n\
         Jane Doe,Governor,CA,,Democratic,2026,https://janedoe.example\n\
         Ann Lee,Mayor,tx,7,,,\n",
    );

    let rows: Vec<_> = DelimitedFileSource::new(file.path())
        .rows()
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].election_year, Some(2026));
    assert_eq!(rows[0].district, None);
    assert_eq!(rows[0].website.as_deref(), Some("https://janedoe.example"));
    assert_eq!(rows[1].state, "TX");
    assert_eq!(rows[1].district.as_deref(), Some("7"));
    assert_eq!(rows[1].source, "file");
}

#[test]
fn test_malformed_row_does_not_stop_iteration() {
    let file = write_file(
        "name,office,state,year\n\
         Jane Doe,Governor,CA,2026\n\
         Bob Roe,Senate,NY,next year\n\
         Ann Lee,Mayor,TX,2025\n",
    );

    let rows: Vec<_> = DelimitedFileSource::new(file.path())
        .rows()
        .unwrap()
        .collect();

    assert_eq!(rows.len(), 3);
    assert!(rows[0].is_ok());
    match &rows[1] {
        Err(SourceError::MalformedRow { line, .. }) => assert_eq!(*line, 3),
        other => panic!("expected malformed row, got {:?}", other),
    }
    assert_eq!(rows[2].as_ref().unwrap().name, "Ann Lee");
}

#[test]
fn test_rows_can_be_restarted() {
    let file = write_file("name,office,state\nJane Doe,Governor,CA\nAnn Lee,Mayor,TX\n");
    let source = DelimitedFileSource::new(file.path());

    let first_pass = source.rows().unwrap().count();
    let second_pass = source.rows().unwrap().count();

    assert_eq!(first_pass, 2);
    assert_eq!(first_pass, second_pass);
}

#[test]
fn test_custom_delimiter() {
    let file = write_file("name\toffice\tstate\tcounty\nAnn Lee\tSheriff\tNY\tKings\n");

    let row = DelimitedFileSource::new(file.path())
        .with_delimiter(b'\t')
        .rows()
        .unwrap()
        .next()
        .unwrap()
        .unwrap();

    assert_eq!(row.slug(false), "ann-lee-ny-kings-sheriff");
}

#[test]
fn test_missing_header_fails_up_front() {
    let file = write_file("full_name,office\nJane Doe,Governor\n");
    assert!(DelimitedFileSource::new(file.path()).rows().is_err());
}

#[test]
fn test_missing_file_is_io_error() {
    let err = DelimitedFileSource::new("/definitely/not/here.csv")
        .rows()
        .err()
        .unwrap();
    assert!(matches!(err, SourceError::Io(_)));
}
