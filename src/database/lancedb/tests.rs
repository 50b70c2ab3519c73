use super::*;

#[test]
fn chunk_record_from_chunk() {
    let mut metadata = Map::new();
    metadata.insert(
        "source".to_string(),
        Value::String("https://shop.example/faq".to_string()),
    );
    let chunk = Chunk {
        content: "Refunds are issued within 14 days".to_string(),
        metadata: metadata.clone(),
        chunk_index: 3,
    };

    let record = ChunkRecord::from_chunk(chunk, vec![0.1, 0.2, 0.3]);

    assert_eq!(record.content, "Refunds are issued within 14 days");
    assert_eq!(record.source, "https://shop.example/faq");
    assert_eq!(record.metadata, metadata);
    assert_eq!(record.chunk_index, 3);
    assert_eq!(record.vector.len(), 3);
    assert!(uuid::Uuid::parse_str(&record.id).is_ok());
    assert!(chrono::DateTime::parse_from_rfc3339(&record.created_at).is_ok());
}

#[test]
fn chunk_record_without_source() {
    let chunk = Chunk {
        content: "extra text".to_string(),
        metadata: Map::new(),
        chunk_index: 0,
    };

    let record = ChunkRecord::from_chunk(chunk, vec![1.0]);

    assert_eq!(record.source, "");
}

#[test]
fn chunk_records_get_unique_ids() {
    let chunk = Chunk {
        content: "same".to_string(),
        metadata: Map::new(),
        chunk_index: 0,
    };

    let first = ChunkRecord::from_chunk(chunk.clone(), vec![1.0]);
    let second = ChunkRecord::from_chunk(chunk, vec![1.0]);

    assert_ne!(first.id, second.id);
}
