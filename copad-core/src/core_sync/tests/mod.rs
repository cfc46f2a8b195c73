/*
    Integration tests for the core_sync subsystem

    Test suite covering:
    - Accept/reject ordering across out-of-order and duplicate delivery
    - Debouncer timing under paused tokio time
    - Engine lifecycle: fetch-or-create, save/rollback, refresh, teardown
    - Cursor capture and restoration against a scripted surface
    - Multi-client end-to-end scenarios over the in-memory backend
*/

pub mod engine_tests;
