use arrow::array::{Array, Float64Array, Int64Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, SchemaRef};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use bytes::Bytes;
use common::{Error, Result};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde_json::{Number, Value};

pub fn batches_to_json(batches: &[RecordBatch]) -> Result<Vec<Value>> {
    let mut json_rows = Vec::new();

    for batch in batches {
        for row_idx in 0..batch.num_rows() {
            let mut row = serde_json::Map::new();

            for (col_idx, field) in batch.schema().fields().iter().enumerate() {
                let column = batch.column(col_idx);
                let value = arrow_array_to_json(column.as_ref(), row_idx)?;
                row.insert(field.name().clone(), value);
            }

            json_rows.push(Value::Object(row));
        }
    }

    Ok(json_rows)
}

/// Numbers stay numbers; dates, timestamps and strings use Arrow's display form.
pub fn arrow_array_to_json(array: &dyn Array, index: usize) -> Result<Value> {
    if array.is_null(index) {
        return Ok(Value::Null);
    }

    Ok(match array.data_type() {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32 => {
            let widened = cast(array, &DataType::Int64)?;
            let values = downcast::<Int64Array>(widened.as_ref())?;
            Value::Number(Number::from(values.value(index)))
        }
        DataType::Float32 | DataType::Float64 => {
            let widened = cast(array, &DataType::Float64)?;
            let values = downcast::<Float64Array>(widened.as_ref())?;
            Number::from_f64(values.value(index))
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
        DataType::Boolean => Value::Bool(array_value_to_string(array, index)? == "true"),
        _ => Value::String(array_value_to_string(array, index)?),
    })
}

fn downcast<T: 'static>(array: &dyn Array) -> Result<&T> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| Error::Other(format!("Unexpected array type {}", array.data_type())))
}

pub fn write_parquet(schema: SchemaRef, batches: &[RecordBatch]) -> Result<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer: Vec<u8> = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(props))?;
    for batch in batches {
        writer.write(batch)?;
    }
    writer.close()?;

    Ok(buffer)
}

pub fn read_parquet(data: Vec<u8>) -> Result<Vec<RecordBatch>> {
    let reader = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Date32Array, StringArray, TimestampMillisecondArray};
    use arrow::datatypes::{Field, Schema, TimeUnit};
    use std::sync::Arc;

    fn sample() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("city", DataType::Utf8, false),
            Field::new("temperature", DataType::Float64, true),
            Field::new("weathercode", DataType::Int64, true),
            Field::new("date", DataType::Date32, false),
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                true,
            ),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["Oslo", "Lima"])),
                Arc::new(Float64Array::from(vec![Some(3.5), None])),
                Arc::new(Int64Array::from(vec![Some(2), None])),
                Arc::new(Date32Array::from(vec![11323, 0])),
                Arc::new(TimestampMillisecondArray::from(vec![
                    Some(1_704_067_200_000),
                    None,
                ])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_batches_to_json_keeps_numbers_and_nulls() {
        let rows = batches_to_json(&[sample()]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["city"], "Oslo");
        assert_eq!(rows[0]["temperature"], 3.5);
        assert_eq!(rows[0]["weathercode"], 2);
        assert_eq!(rows[0]["date"], "2001-01-01");
        assert!(rows[0]["timestamp"].as_str().unwrap().starts_with("2024-01-01T00:00:00"));
        assert!(rows[1]["temperature"].is_null());
        assert!(rows[1]["timestamp"].is_null());
    }

    #[test]
    fn test_parquet_part_round_trip() {
        let batch = sample();
        let data = write_parquet(batch.schema(), &[batch.clone()]).unwrap();

        let restored = read_parquet(data).unwrap();
        let rows: usize = restored.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        assert_eq!(
            batches_to_json(&restored).unwrap(),
            batches_to_json(&[batch]).unwrap()
        );
    }
}
