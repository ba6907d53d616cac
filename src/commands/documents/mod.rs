pub mod finish_document_command;
